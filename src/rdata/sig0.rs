//! Record data for the KEY and SIG record types.
//!
//! These are the record types of transaction signatures as used by
//! SIG(0): KEY publishes a signer's public key in the DNS, SIG carries a
//! detached signature over a message. Their wire formats are those of
//! DNSKEY and RRSIG, but under the original type codes from [RFC 2535].
//!
//! The signing and verification logic itself lives in [`crate::sig0`].
//!
//! [RFC 2535]: https://tools.ietf.org/html/rfc2535

use core::cmp::Ordering;
use core::fmt;
use domain::base::cmp::CanonicalOrd;
use domain::base::iana::{Rtype, SecAlg};
use domain::base::name::{ParsedName, ToName};
use domain::base::rdata::{
    ComposeRecordData, LongRecordData, ParseRecordData, RecordData,
};
use domain::base::wire::{Compose, Composer, Parse, ParseError};
use domain::base::Ttl;
use domain::rdata::dnssec::Timestamp;
use domain::utils::base64;
use octseq::octets::{Octets, OctetsFrom, OctetsInto};
use octseq::parse::Parser;

//------------ Key -----------------------------------------------------------

/// KEY record data.
///
/// The rdata is that of DNSKEY: flags, protocol, algorithm, and the raw
/// public key. A signer publishes its update key as a KEY record at its
/// own name.
#[derive(Clone)]
pub struct Key<Octs> {
    flags: u16,
    protocol: u8,
    algorithm: SecAlg,
    public_key: Octs,
}

impl Key<()> {
    /// The rtype of this record data type.
    pub const RTYPE: Rtype = Rtype::KEY;
}

impl<Octs> Key<Octs> {
    pub fn new(
        flags: u16,
        protocol: u8,
        algorithm: SecAlg,
        public_key: Octs,
    ) -> Result<Self, LongRecordData>
    where
        Octs: AsRef<[u8]>,
    {
        LongRecordData::check_len(
            usize::from(
                u16::COMPOSE_LEN + u8::COMPOSE_LEN + SecAlg::COMPOSE_LEN,
            )
            .checked_add(public_key.as_ref().len())
            .expect("long key"),
        )?;
        Ok(Key {
            flags,
            protocol,
            algorithm,
            public_key,
        })
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    pub fn public_key(&self) -> &Octs {
        &self.public_key
    }

    pub fn into_public_key(self) -> Octs {
        self.public_key
    }

    /// Returns the key tag for this KEY data.
    ///
    /// Computed over the rdata as in [RFC 4034, Appendix B].
    ///
    /// [RFC 4034, Appendix B]: https://tools.ietf.org/html/rfc4034#appendix-B
    pub fn key_tag(&self) -> u16
    where
        Octs: AsRef<[u8]>,
    {
        // Add octets at even indexes shifted left by 8 bits, octets at
        // odd indexes as they are, then fold the carry back in.
        let mut res = u32::from(self.flags);
        res += u32::from(self.protocol) << 8;
        res += u32::from(self.algorithm.to_int());
        let mut iter = self.public_key.as_ref().iter();
        loop {
            match iter.next() {
                Some(&x) => res += u32::from(x) << 8,
                None => break,
            }
            match iter.next() {
                Some(&x) => res += u32::from(x),
                None => break,
            }
        }
        res += (res >> 16) & 0xFFFF;
        (res & 0xFFFF) as u16
    }

    pub fn parse<'a, Src: Octets<Range<'a> = Octs> + ?Sized>(
        parser: &mut Parser<'a, Src>,
    ) -> Result<Self, ParseError> {
        let len = match parser.remaining().checked_sub(4) {
            Some(len) => len,
            None => return Err(ParseError::ShortInput),
        };
        Ok(Key {
            flags: u16::parse(parser)?,
            protocol: u8::parse(parser)?,
            algorithm: SecAlg::parse(parser)?,
            public_key: parser.parse_octets(len)?,
        })
    }
}

//--- OctetsFrom

impl<Octs, SrcOcts> OctetsFrom<Key<SrcOcts>> for Key<Octs>
where
    Octs: OctetsFrom<SrcOcts>,
{
    type Error = Octs::Error;

    fn try_octets_from(source: Key<SrcOcts>) -> Result<Self, Self::Error> {
        Ok(Key {
            flags: source.flags,
            protocol: source.protocol,
            algorithm: source.algorithm,
            public_key: source.public_key.try_octets_into()?,
        })
    }
}

//--- PartialEq and Eq

impl<Octs, Other> PartialEq<Key<Other>> for Key<Octs>
where
    Octs: AsRef<[u8]>,
    Other: AsRef<[u8]>,
{
    fn eq(&self, other: &Key<Other>) -> bool {
        self.flags == other.flags
            && self.protocol == other.protocol
            && self.algorithm == other.algorithm
            && self.public_key.as_ref() == other.public_key.as_ref()
    }
}

impl<Octs: AsRef<[u8]>> Eq for Key<Octs> {}

//--- PartialOrd, CanonicalOrd, and Ord

impl<Octs, Other> PartialOrd<Key<Other>> for Key<Octs>
where
    Octs: AsRef<[u8]>,
    Other: AsRef<[u8]>,
{
    fn partial_cmp(&self, other: &Key<Other>) -> Option<Ordering> {
        Some(self.canonical_cmp(other))
    }
}

impl<Octs, Other> CanonicalOrd<Key<Other>> for Key<Octs>
where
    Octs: AsRef<[u8]>,
    Other: AsRef<[u8]>,
{
    fn canonical_cmp(&self, other: &Key<Other>) -> Ordering {
        match self.flags.cmp(&other.flags) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.protocol.cmp(&other.protocol) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.algorithm.cmp(&other.algorithm) {
            Ordering::Equal => {}
            other => return other,
        }
        self.public_key.as_ref().cmp(other.public_key.as_ref())
    }
}

impl<Octs: AsRef<[u8]>> Ord for Key<Octs> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_cmp(other)
    }
}

//--- RecordData, ParseRecordData, ComposeRecordData

impl<Octs> RecordData for Key<Octs> {
    fn rtype(&self) -> Rtype {
        Key::RTYPE
    }
}

impl<'a, Octs> ParseRecordData<'a, Octs> for Key<Octs::Range<'a>>
where
    Octs: Octets + ?Sized,
{
    fn parse_rdata(
        rtype: Rtype,
        parser: &mut Parser<'a, Octs>,
    ) -> Result<Option<Self>, ParseError> {
        if rtype == Key::RTYPE {
            Self::parse(parser).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<Octs: AsRef<[u8]>> ComposeRecordData for Key<Octs> {
    fn rdlen(&self, _compress: bool) -> Option<u16> {
        Some(
            u16::try_from(self.public_key.as_ref().len())
                .expect("long key")
                .checked_add(
                    u16::COMPOSE_LEN + u8::COMPOSE_LEN + SecAlg::COMPOSE_LEN,
                )
                .expect("long key"),
        )
    }

    fn compose_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.flags.compose(target)?;
        self.protocol.compose(target)?;
        self.algorithm.compose(target)?;
        target.append_slice(self.public_key.as_ref())
    }

    fn compose_canonical_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.compose_rdata(target)
    }
}

//--- Display and Debug

impl<Octs: AsRef<[u8]>> fmt::Display for Key<Octs> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} ", self.flags, self.protocol, self.algorithm)?;
        base64::display(&self.public_key, f)
    }
}

impl<Octs: AsRef<[u8]>> fmt::Debug for Key<Octs> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Key")
            .field("flags", &self.flags)
            .field("protocol", &self.protocol)
            .field("algorithm", &self.algorithm)
            .field("public_key", &self.public_key.as_ref())
            .finish()
    }
}

//------------ ProtoSig ------------------------------------------------------

/// The SIG RDATA to be included when creating the signature.
///
/// For SIG(0) the type covered is zero, the labels count is zero, and the
/// original TTL is zero; only the temporal window, the key tag, and the
/// signer name carry information.
#[derive(Clone, Debug)]
pub struct ProtoSig<Name> {
    type_covered: Rtype,
    algorithm: SecAlg,
    labels: u8,
    original_ttl: Ttl,
    expiration: Timestamp,
    inception: Timestamp,
    key_tag: u16,
    signer_name: Name,
}

impl<Name> ProtoSig<Name> {
    /// Creates the unsigned rdata of a SIG(0) signature.
    pub fn sig0(
        algorithm: SecAlg,
        expiration: Timestamp,
        inception: Timestamp,
        key_tag: u16,
        signer_name: Name,
    ) -> Self {
        ProtoSig {
            type_covered: Rtype::from_int(0),
            algorithm,
            labels: 0,
            original_ttl: Ttl::from_secs(0),
            expiration,
            inception,
            key_tag,
            signer_name,
        }
    }

    /// Adds the signature, producing complete record data.
    pub fn into_sig<Octs: AsRef<[u8]>>(
        self,
        signature: Octs,
    ) -> Result<Sig<Octs, Name>, LongRecordData>
    where
        Name: ToName,
    {
        Sig::new(
            self.type_covered,
            self.algorithm,
            self.labels,
            self.original_ttl,
            self.expiration,
            self.inception,
            self.key_tag,
            self.signer_name,
            signature,
        )
    }
}

impl<Name: ToName> ProtoSig<Name> {
    /// Appends the rdata, signature field excluded, to `target`.
    ///
    /// The signer name is written in canonical form as required for
    /// signature calculation.
    pub fn compose<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.type_covered.compose(target)?;
        self.algorithm.compose(target)?;
        self.labels.compose(target)?;
        self.original_ttl.compose(target)?;
        self.expiration.compose(target)?;
        self.inception.compose(target)?;
        self.key_tag.compose(target)?;
        self.signer_name.compose_canonical(target)
    }
}

//------------ Sig -----------------------------------------------------------

/// SIG record data.
///
/// The rdata is that of RRSIG. A SIG(0) record appears as the last record
/// of the additional section of the message it signs.
#[derive(Clone)]
pub struct Sig<Octs, Name> {
    type_covered: Rtype,
    algorithm: SecAlg,
    labels: u8,
    original_ttl: Ttl,
    expiration: Timestamp,
    inception: Timestamp,
    key_tag: u16,
    signer_name: Name,
    signature: Octs,
}

impl Sig<(), ()> {
    /// The rtype of this record data type.
    pub const RTYPE: Rtype = Rtype::SIG;
}

impl<Octs, Name> Sig<Octs, Name> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        type_covered: Rtype,
        algorithm: SecAlg,
        labels: u8,
        original_ttl: Ttl,
        expiration: Timestamp,
        inception: Timestamp,
        key_tag: u16,
        signer_name: Name,
        signature: Octs,
    ) -> Result<Self, LongRecordData>
    where
        Octs: AsRef<[u8]>,
        Name: ToName,
    {
        LongRecordData::check_len(
            usize::from(
                Rtype::COMPOSE_LEN
                    + SecAlg::COMPOSE_LEN
                    + u8::COMPOSE_LEN
                    + u32::COMPOSE_LEN
                    + Timestamp::COMPOSE_LEN
                    + Timestamp::COMPOSE_LEN
                    + u16::COMPOSE_LEN
                    + signer_name.compose_len(),
            )
            .checked_add(signature.as_ref().len())
            .expect("long signature"),
        )?;
        Ok(Sig {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer_name,
            signature,
        })
    }

    pub fn type_covered(&self) -> Rtype {
        self.type_covered
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    pub fn labels(&self) -> u8 {
        self.labels
    }

    pub fn original_ttl(&self) -> Ttl {
        self.original_ttl
    }

    pub fn expiration(&self) -> Timestamp {
        self.expiration
    }

    pub fn inception(&self) -> Timestamp {
        self.inception
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn signer_name(&self) -> &Name {
        &self.signer_name
    }

    pub fn signature(&self) -> &Octs {
        &self.signature
    }

    /// Returns the unsigned rdata for signature calculation.
    pub fn proto(&self) -> ProtoSig<&Name> {
        ProtoSig {
            type_covered: self.type_covered,
            algorithm: self.algorithm,
            labels: self.labels,
            original_ttl: self.original_ttl,
            expiration: self.expiration,
            inception: self.inception,
            key_tag: self.key_tag,
            signer_name: &self.signer_name,
        }
    }
}

impl<Octs> Sig<Octs, ParsedName<Octs>> {
    pub fn parse<'a, Src: Octets<Range<'a> = Octs> + ?Sized + 'a>(
        parser: &mut Parser<'a, Src>,
    ) -> Result<Self, ParseError> {
        let type_covered = Rtype::parse(parser)?;
        let algorithm = SecAlg::parse(parser)?;
        let labels = u8::parse(parser)?;
        let original_ttl = Ttl::parse(parser)?;
        let expiration = Timestamp::parse(parser)?;
        let inception = Timestamp::parse(parser)?;
        let key_tag = u16::parse(parser)?;
        let signer_name = ParsedName::parse(parser)?;
        let len = parser.remaining();
        let signature = parser.parse_octets(len)?;
        Ok(Sig {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer_name,
            signature,
        })
    }
}

//--- PartialEq and Eq

impl<N, NN, O, OO> PartialEq<Sig<OO, NN>> for Sig<O, N>
where
    N: ToName,
    NN: ToName,
    O: AsRef<[u8]>,
    OO: AsRef<[u8]>,
{
    fn eq(&self, other: &Sig<OO, NN>) -> bool {
        self.type_covered == other.type_covered
            && self.algorithm == other.algorithm
            && self.labels == other.labels
            && self.original_ttl == other.original_ttl
            && self.expiration.into_int() == other.expiration.into_int()
            && self.inception.into_int() == other.inception.into_int()
            && self.key_tag == other.key_tag
            && self.signer_name.name_eq(&other.signer_name)
            && self.signature.as_ref() == other.signature.as_ref()
    }
}

impl<O: AsRef<[u8]>, N: ToName> Eq for Sig<O, N> {}

//--- RecordData, ParseRecordData, ComposeRecordData

impl<Octs, Name> RecordData for Sig<Octs, Name> {
    fn rtype(&self) -> Rtype {
        Sig::RTYPE
    }
}

impl<'a, Octs> ParseRecordData<'a, Octs>
    for Sig<Octs::Range<'a>, ParsedName<Octs::Range<'a>>>
where
    Octs: Octets + ?Sized,
{
    fn parse_rdata(
        rtype: Rtype,
        parser: &mut Parser<'a, Octs>,
    ) -> Result<Option<Self>, ParseError> {
        if rtype == Sig::RTYPE {
            Self::parse(parser).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<Octs, Name> ComposeRecordData for Sig<Octs, Name>
where
    Octs: AsRef<[u8]>,
    Name: ToName,
{
    fn rdlen(&self, _compress: bool) -> Option<u16> {
        Some(
            u16::checked_add(
                Rtype::COMPOSE_LEN
                    + SecAlg::COMPOSE_LEN
                    + u8::COMPOSE_LEN
                    + u32::COMPOSE_LEN
                    + Timestamp::COMPOSE_LEN
                    + Timestamp::COMPOSE_LEN
                    + u16::COMPOSE_LEN
                    + self.signer_name.compose_len(),
                u16::try_from(self.signature.as_ref().len())
                    .expect("long signature"),
            )
            .expect("long signature"),
        )
    }

    fn compose_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.compose_head(target)?;
        self.signer_name.compose(target)?;
        target.append_slice(self.signature.as_ref())
    }

    fn compose_canonical_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.compose_head(target)?;
        self.signer_name.compose_canonical(target)?;
        target.append_slice(self.signature.as_ref())
    }
}

impl<Octs: AsRef<[u8]>, Name: ToName> Sig<Octs, Name> {
    fn compose_head<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.type_covered.compose(target)?;
        self.algorithm.compose(target)?;
        self.labels.compose(target)?;
        self.original_ttl.compose(target)?;
        self.expiration.compose(target)?;
        self.inception.compose(target)?;
        self.key_tag.compose(target)
    }
}

//--- Display and Debug

impl<Octs, Name> fmt::Display for Sig<Octs, Name>
where
    Octs: AsRef<[u8]>,
    Name: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {}. ",
            self.type_covered,
            self.algorithm,
            self.labels,
            self.original_ttl.as_secs(),
            self.expiration,
            self.inception,
            self.key_tag,
            self.signer_name
        )?;
        base64::display(&self.signature, f)
    }
}

impl<Octs, Name> fmt::Debug for Sig<Octs, Name>
where
    Octs: AsRef<[u8]>,
    Name: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sig")
            .field("type_covered", &self.type_covered)
            .field("algorithm", &self.algorithm)
            .field("labels", &self.labels)
            .field("original_ttl", &self.original_ttl)
            .field("expiration", &self.expiration)
            .field("inception", &self.inception)
            .field("key_tag", &self.key_tag)
            .field("signer_name", &self.signer_name)
            .field("signature", &self.signature.as_ref())
            .finish()
    }
}

//============ Testing ======================================================
