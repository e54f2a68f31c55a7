//! Comparing two RRsets.
//!
//! Delegation synchronization boils down to repeatedly answering one
//! question: which records does the parent have to add and which does it
//! have to remove so that its copy of the delegation matches the child's
//! authoritative data? [`diff`] answers it.

use domain::base::iana::Rtype;
use domain::base::name::ToName;
use domain::base::rdata::RecordData;
use domain::base::record::Record;
use std::vec::Vec;

//------------ diff ----------------------------------------------------------

/// Compares two sets of records of a single type.
///
/// Every record of `old` without an exact counterpart in `new` ends up in
/// [`removes`][RrsetDiff::removes], every record of `new` without a
/// counterpart in `old` in [`adds`][RrsetDiff::adds]. Two records are
/// counterparts if owner, record type, and record data are equal; TTL and
/// class are ignored. Signature records are skipped entirely, they follow
/// their RRset.
///
/// The input order is preserved in the output lists. The comparison is
/// quadratic, which is fine for the handful of records in a delegation.
pub fn diff<N, D>(
    old: &[Record<N, D>],
    new: &[Record<N, D>],
) -> RrsetDiff<N, D>
where
    N: ToName + Clone,
    D: RecordData + PartialEq + Clone,
{
    let removes = old
        .iter()
        .filter(|record| !is_signature(record))
        .filter(|record| !new.iter().any(|other| is_duplicate(record, other)))
        .cloned()
        .collect();
    let adds = new
        .iter()
        .filter(|record| !is_signature(record))
        .filter(|record| !old.iter().any(|other| is_duplicate(record, other)))
        .cloned()
        .collect();
    RrsetDiff { adds, removes }
}

/// Semantic record equality: TTL and class do not matter.
fn is_duplicate<N, D>(left: &Record<N, D>, right: &Record<N, D>) -> bool
where
    N: ToName,
    D: RecordData + PartialEq,
{
    !is_signature(right)
        && left.rtype() == right.rtype()
        && left.owner().name_eq(right.owner())
        && left.data() == right.data()
}

fn is_signature<N, D: RecordData>(record: &Record<N, D>) -> bool {
    matches!(record.rtype(), Rtype::RRSIG | Rtype::SIG)
}

//------------ RrsetDiff -----------------------------------------------------

/// The outcome of comparing two RRsets.
#[derive(Clone, Debug)]
pub struct RrsetDiff<N, D> {
    /// Records present in the new set only.
    pub adds: Vec<Record<N, D>>,

    /// Records present in the old set only.
    pub removes: Vec<Record<N, D>>,
}

impl<N, D> RrsetDiff<N, D> {
    /// Returns whether the two sets differ at all.
    pub fn differs(&self) -> bool {
        !self.adds.is_empty() || !self.removes.is_empty()
    }
}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::name::Name;
    use domain::base::rdata::UnknownRecordData;
    use domain::base::Ttl;
    use std::str::FromStr;
    use std::vec::Vec;

    type TestRecord = Record<Name<Vec<u8>>, UnknownRecordData<Vec<u8>>>;

    fn ns(owner: &str, target: &[u8], ttl: u32) -> TestRecord {
        Record::new(
            Name::from_str(owner).unwrap(),
            Class::IN,
            Ttl::from_secs(ttl),
            UnknownRecordData::from_octets(Rtype::NS, target.to_vec())
                .unwrap(),
        )
    }

    fn rrsig(owner: &str) -> TestRecord {
        Record::new(
            Name::from_str(owner).unwrap(),
            Class::IN,
            Ttl::from_secs(3600),
            UnknownRecordData::from_octets(Rtype::RRSIG, vec![1, 2, 3])
                .unwrap(),
        )
    }

    #[test]
    fn adds_and_removes() {
        let old = vec![ns("example.", b"a", 3600), ns("example.", b"b", 3600)];
        let new = vec![ns("example.", b"b", 3600), ns("example.", b"c", 3600)];
        let diff = diff(&old, &new);
        assert!(diff.differs());
        assert_eq!(diff.removes, vec![ns("example.", b"a", 3600)]);
        assert_eq!(diff.adds, vec![ns("example.", b"c", 3600)]);
    }

    #[test]
    fn ttl_is_ignored() {
        let old = vec![ns("example.", b"a", 3600)];
        let new = vec![ns("example.", b"a", 60)];
        assert!(!diff(&old, &new).differs());
    }

    #[test]
    fn owner_case_is_ignored() {
        let old = vec![ns("Example.", b"a", 3600)];
        let new = vec![ns("example.", b"a", 3600)];
        assert!(!diff(&old, &new).differs());
    }

    #[test]
    fn identical_sets() {
        let set = vec![ns("example.", b"a", 300), ns("example.", b"b", 300)];
        let diff = diff(&set, &set);
        assert!(!diff.differs());
        assert!(diff.adds.is_empty());
        assert!(diff.removes.is_empty());
    }

    #[test]
    fn symmetry() {
        let left = vec![ns("example.", b"a", 1), ns("example.", b"b", 1)];
        let right = vec![ns("example.", b"b", 1), ns("example.", b"c", 1)];
        let forward = diff(&left, &right);
        let backward = diff(&right, &left);
        assert_eq!(forward.adds, backward.removes);
        assert_eq!(forward.removes, backward.adds);
    }

    #[test]
    fn signatures_are_skipped() {
        let old = vec![ns("example.", b"a", 1), rrsig("example.")];
        let new = vec![ns("example.", b"a", 1)];
        assert!(!diff(&old, &new).differs());

        // A signature on the new side neither adds nor matches.
        let old = vec![ns("example.", b"a", 1)];
        let new = vec![ns("example.", b"a", 1), rrsig("example.")];
        assert!(!diff(&old, &new).differs());
    }

    #[test]
    fn order_is_preserved() {
        let old: Vec<TestRecord> = Vec::new();
        let new = vec![
            ns("example.", b"c", 1),
            ns("example.", b"a", 1),
            ns("example.", b"b", 1),
        ];
        let diff = diff(&old, &new);
        assert_eq!(diff.adds, new);
    }
}
