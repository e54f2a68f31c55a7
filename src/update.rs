//! Building and sending dynamic update messages.
//!
//! An update message asks the parent's server to bring one zone's
//! delegation records in line with the child's data: the zone section
//! names the zone to change, the update section lists removals and
//! additions. [`build_update`] produces the message, [`send_update`]
//! delivers it to a discovered target, and [`parse_update_section`]
//! is the receiving side's view of the same wire format.

use crate::discovery::{exchange_raw, DsyncTarget};
use crate::rdata::Key;
use crate::{StoredName, StoredRecord};
use bytes::Bytes;
use core::fmt;
use core::time::Duration;
use domain::base::iana::{Class, Opcode, Rcode, Rtype};
use domain::base::message::Message;
use domain::base::message_builder::{AdditionalBuilder, PushError};
use domain::base::name::{FlattenInto, ParsedName, ToName};
use domain::base::rdata::{ComposeRecordData, UnknownRecordData};
use domain::base::record::Record;
use domain::base::{MessageBuilder, Ttl};
use domain::rdata::AllRecordData;
use octseq::octets::Octets;
use std::error;
use std::net::SocketAddr;
use std::vec::Vec;
use tracing::{debug, info, warn};

//------------ UpdateAction --------------------------------------------------

/// One entry of an update message's update section.
///
/// The class of an update-section record encodes what to do with it;
/// this enum is that encoding, decoded. Anything with a class the
/// protocol does not define fails to become an action.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateAction {
    /// Add this record.
    Add(StoredRecord),

    /// Delete the records exactly matching this one, TTL aside.
    Delete(StoredRecord),

    /// Delete the whole RRset of this type at this owner.
    DeleteRrset(StoredName, Rtype),
}

impl UpdateAction {
    /// The owner name the action touches.
    pub fn owner(&self) -> &StoredName {
        match self {
            UpdateAction::Add(record) => record.owner(),
            UpdateAction::Delete(record) => record.owner(),
            UpdateAction::DeleteRrset(owner, _) => owner,
        }
    }

    /// The record type the action touches.
    pub fn rtype(&self) -> Rtype {
        match self {
            UpdateAction::Add(record) => record.rtype(),
            UpdateAction::Delete(record) => record.rtype(),
            UpdateAction::DeleteRrset(_, rtype) => *rtype,
        }
    }

    /// Whether the action removes data.
    pub fn is_remove(&self) -> bool {
        !matches!(self, UpdateAction::Add(_))
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UpdateAction::Add(record) => write!(f, "add {}", record),
            UpdateAction::Delete(record) => write!(f, "delete {}", record),
            UpdateAction::DeleteRrset(owner, rtype) => {
                write!(f, "delete rrset {} {}", owner, rtype)
            }
        }
    }
}

//------------ parse_update_section ------------------------------------------

/// Extracts the actions from the update section of an UPDATE message.
///
/// Records whose class does not encode an update action are skipped with
/// a log line; a record whose data cannot be parsed at all fails the
/// whole message.
pub fn parse_update_section<Octs: Octets>(
    message: &Message<Octs>,
) -> Result<Vec<UpdateAction>, ParseUpdateError> {
    let mut actions = Vec::new();
    // Work from an owned `Bytes` copy so the flattened records can own
    // their data independently of the caller's octets type.
    let message = Message::from_octets(Bytes::copy_from_slice(
        message.as_slice(),
    ))
    .map_err(|_| ParseUpdateError)?;
    let section =
        message.authority().map_err(|_| ParseUpdateError)?;
    for record in section {
        let record = record.map_err(|_| ParseUpdateError)?;
        match record.class() {
            Class::ANY => {
                actions.push(UpdateAction::DeleteRrset(
                    record.owner().to_bytes(),
                    record.rtype(),
                ));
            }
            class @ (Class::IN | Class::NONE) => {
                let record = record
                    .to_record::<AllRecordData<_, ParsedName<_>>>()
                    .map_err(|_| ParseUpdateError)?
                    .ok_or(ParseUpdateError)?;
                let record: StoredRecord = record
                    .try_flatten_into()
                    .map_err(|_| ParseUpdateError)?;
                actions.push(if class == Class::IN {
                    UpdateAction::Add(record)
                } else {
                    UpdateAction::Delete(record)
                });
            }
            class => {
                debug!(
                    "ignoring update action with class {} at {}",
                    class,
                    record.owner()
                );
            }
        }
    }
    Ok(actions)
}

//------------ build_update --------------------------------------------------

/// Builds an update message for the parent zone.
///
/// Removals come first so that servers applying the section in order
/// never hold both the old and the new data. Removing an NS record whose
/// target lies inside the child zone also removes any address glue for
/// that target: the removals are emitted unconditionally and are no-ops
/// if no glue exists, while a dangling NS record would not be.
pub fn build_update(
    zone: &StoredName,
    child: &StoredName,
    adds: &[StoredRecord],
    removes: &[StoredRecord],
) -> Result<AdditionalBuilder<Vec<u8>>, PushError> {
    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_opcode(Opcode::UPDATE);
    builder.header_mut().set_id(rand::random());

    let mut builder = builder.question();
    builder.push((zone, Rtype::SOA))?;

    let mut builder = builder.answer().authority();
    for record in removes {
        builder.push(Record::new(
            record.owner().clone(),
            Class::NONE,
            Ttl::from_secs(0),
            record.data().clone(),
        ))?;
        if let AllRecordData::Ns(ns) = record.data() {
            if ns.nsdname().ends_with(child) {
                for rtype in [Rtype::A, Rtype::AAAA] {
                    builder.push(Record::new(
                        ns.nsdname().clone(),
                        Class::ANY,
                        Ttl::from_secs(0),
                        UnknownRecordData::from_octets(
                            rtype,
                            Bytes::new(),
                        )
                        .expect("empty rdata"),
                    ))?;
                }
            }
        }
    }
    for record in adds {
        builder.push(record.clone())?;
    }

    Ok(builder.additional())
}

/// Builds the action pair that swaps a signing key for its successor.
pub fn rollover_actions(
    owner: &StoredName,
    old_key: &Key<Bytes>,
    new_key: &Key<Bytes>,
    ttl: Ttl,
) -> (Vec<StoredRecord>, Vec<StoredRecord>) {
    let adds = vec![key_record(owner, new_key, ttl)];
    let removes = vec![key_record(owner, old_key, ttl)];
    (adds, removes)
}

fn key_record(
    owner: &StoredName,
    key: &Key<Bytes>,
    ttl: Ttl,
) -> StoredRecord {
    let mut rdata = Vec::new();
    key.compose_rdata(&mut rdata).expect("infallible");
    Record::new(
        owner.clone(),
        Class::IN,
        ttl,
        UnknownRecordData::from_octets(
            Key::RTYPE,
            Bytes::from(rdata),
        )
        .expect("short rdata")
        .into(),
    )
}

/// Returns the targets of the NS records that lie inside `zone`.
pub fn in_bailiwick_ns(
    zone: &StoredName,
    records: &[StoredRecord],
) -> Vec<StoredName> {
    records
        .iter()
        .filter_map(|record| match record.data() {
            AllRecordData::Ns(ns) if ns.nsdname().ends_with(zone) => {
                Some(ns.nsdname().clone())
            }
            _ => None,
        })
        .collect()
}

//------------ send_update ---------------------------------------------------

/// Sends an update to a discovered delivery target.
///
/// The target's addresses are tried in order until one of them answers
/// with NOERROR. A non-success answer or a transport failure moves on to
/// the next address; running out of addresses is the final error and is
/// left to the caller to deal with.
pub async fn send_update(
    message: Message<Vec<u8>>,
    zone: &StoredName,
    target: &DsyncTarget,
    timeout: Duration,
) -> Result<(), SendError> {
    if target.addresses.is_empty() {
        return Err(SendError::NoAddresses);
    }
    for &addr in &target.addresses {
        let addr = SocketAddr::new(addr, target.port);
        debug!(
            "sending update for zone {} to {} at {}",
            zone, target.name, addr
        );
        // The signature covers the exact message bytes, so the update
        // bypasses the rewriting client transports.
        match exchange_raw(addr, &message, timeout).await {
            Ok(response) => {
                let rcode = response.header().rcode();
                if rcode == Rcode::NOERROR {
                    info!("update for zone {} accepted by {}", zone, addr);
                    return Ok(());
                }
                warn!(
                    "update for zone {} refused by {} with {}",
                    zone, addr, rcode
                );
            }
            Err(err) => {
                warn!(
                    "sending update for zone {} to {} failed: {}",
                    zone, addr, err
                );
            }
        }
    }
    Err(SendError::Exhausted)
}

//============ Error Types ===================================================

//------------ ParseUpdateError ----------------------------------------------

/// The update section of a message could not be interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseUpdateError;

impl fmt::Display for ParseUpdateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("malformed update section")
    }
}

impl error::Error for ParseUpdateError {}

//------------ SendError -----------------------------------------------------

/// Delivering an update failed for good.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendError {
    /// The target resolved to no addresses at all.
    NoAddresses,

    /// Every address was tried and none accepted the update.
    Exhausted,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SendError::NoAddresses => "delivery target has no addresses",
            SendError::Exhausted => "no delivery address accepted the update",
        })
    }
}

impl error::Error for SendError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::rdata::Ns;
    use std::str::FromStr;

    fn name(name: &str) -> StoredName {
        StoredName::from_str(name).unwrap()
    }

    fn ns(owner: &str, target: &str) -> StoredRecord {
        Record::new(
            name(owner),
            Class::IN,
            Ttl::from_secs(3600),
            Ns::new(name(target)).into(),
        )
    }

    // Record equality covers the class, so removals compare against
    // class NONE copies.
    fn ns_removal(owner: &str, target: &str) -> StoredRecord {
        Record::new(
            name(owner),
            Class::NONE,
            Ttl::from_secs(0),
            Ns::new(name(target)).into(),
        )
    }

    #[test]
    fn removes_then_adds() {
        let zone = name("example.");
        let child = name("child.example.");
        let builder = build_update(
            &zone,
            &child,
            &[ns("child.example.", "ns2.elsewhere.net.")],
            &[ns("child.example.", "ns1.elsewhere.net.")],
        )
        .unwrap();
        let message = builder.into_message();
        assert_eq!(message.header().opcode(), Opcode::UPDATE);

        let actions = parse_update_section(&message).unwrap();
        assert_eq!(
            actions,
            vec![
                UpdateAction::Delete(ns_removal(
                    "child.example.",
                    "ns1.elsewhere.net."
                )),
                UpdateAction::Add(ns(
                    "child.example.",
                    "ns2.elsewhere.net."
                )),
            ]
        );
    }

    #[test]
    fn glue_cascade_for_in_bailiwick_ns() {
        let zone = name("example.");
        let child = name("child.example.");
        let message = build_update(
            &zone,
            &child,
            &[],
            &[ns("child.example.", "ns1.child.example.")],
        )
        .unwrap()
        .into_message();

        let actions = parse_update_section(&message).unwrap();
        assert_eq!(
            actions,
            vec![
                UpdateAction::Delete(ns_removal(
                    "child.example.",
                    "ns1.child.example."
                )),
                UpdateAction::DeleteRrset(
                    name("ns1.child.example."),
                    Rtype::A
                ),
                UpdateAction::DeleteRrset(
                    name("ns1.child.example."),
                    Rtype::AAAA
                ),
            ]
        );
    }

    #[test]
    fn no_cascade_for_foreign_ns() {
        let zone = name("example.");
        let child = name("child.example.");
        let message = build_update(
            &zone,
            &child,
            &[],
            &[ns("child.example.", "ns1.elsewhere.net.")],
        )
        .unwrap()
        .into_message();

        let actions = parse_update_section(&message).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], UpdateAction::Delete(_)));
    }

    #[test]
    fn zone_section() {
        let zone = name("example.");
        let child = name("child.example.");
        let message = build_update(&zone, &child, &[], &[])
            .unwrap()
            .into_message();
        let question = message.sole_question().unwrap();
        assert_eq!(question.qtype(), Rtype::SOA);
        assert!(question.qname().name_eq(&zone));
    }

    #[test]
    fn action_accessors() {
        let add = UpdateAction::Add(ns("a.example.", "ns.example."));
        assert_eq!(add.owner(), &name("a.example."));
        assert_eq!(add.rtype(), Rtype::NS);
        assert!(!add.is_remove());

        let del = UpdateAction::DeleteRrset(name("a.example."), Rtype::A);
        assert_eq!(del.rtype(), Rtype::A);
        assert!(del.is_remove());
    }

    #[test]
    fn rollover_swaps_keys() {
        use domain::base::iana::SecAlg;

        let owner = name("child.example.");
        let old_key =
            Key::new(512, 3, SecAlg::ED25519, Bytes::from(vec![1; 32]))
                .unwrap();
        let new_key =
            Key::new(512, 3, SecAlg::ED25519, Bytes::from(vec![2; 32]))
                .unwrap();
        let (adds, removes) = rollover_actions(
            &owner,
            &old_key,
            &new_key,
            Ttl::from_secs(300),
        );
        assert_eq!(adds.len(), 1);
        assert_eq!(removes.len(), 1);
        assert_eq!(adds[0].rtype(), Rtype::KEY);
        assert_eq!(removes[0].rtype(), Rtype::KEY);
        assert_ne!(adds[0], removes[0]);
    }

    #[test]
    fn bailiwick_filter() {
        let records = vec![
            ns("child.example.", "ns1.child.example."),
            ns("child.example.", "ns2.elsewhere.net."),
        ];
        let inb = in_bailiwick_ns(&name("child.example."), &records);
        assert_eq!(inb, vec![name("ns1.child.example.")]);
    }
}
