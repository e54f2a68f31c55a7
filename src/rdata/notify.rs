//! Record data for the private NOTIFY record type.
//!
//! A zone advertises where delegation synchronization messages for it
//! should be delivered by publishing NOTIFY records at its apex. Each
//! record names the record type the advertisement concerns, the delivery
//! scheme, and the port and host to deliver to.
//!
//! The record type lives in the private-use part of the type space; see
//! [`Notify::RTYPE`].

use bytes::Bytes;
use core::cmp::Ordering;
use core::str::FromStr;
use core::{fmt, str};
use domain::base::cmp::CanonicalOrd;
use domain::base::iana::Rtype;
use domain::base::name::{FlattenInto, Name, ParsedName, ToName};
use domain::base::rdata::{ComposeRecordData, ParseRecordData, RecordData};
use domain::base::scan::{Scan, Scanner, ScannerError};
use domain::base::wire::{Compose, Composer, Parse, ParseError};
use domain::utils::base16;
use octseq::octets::{Octets, OctetsFrom, OctetsInto};
use octseq::parse::Parser;
use std::vec::Vec;

//------------ Notify --------------------------------------------------------

/// NOTIFY record data.
///
/// The record advertises a single synchronization capability of the zone
/// it is published at: for records of type [`rtype`][Self::rtype], deliver
/// via [`scheme`][Self::scheme] to [`target`][Self::target] on
/// [`port`][Self::port].
///
/// The wire format is the two-octet record type, a one-octet scheme, a
/// two-octet port, and the target host as an uncompressed domain name.
/// Trailing fields may be absent in received data; such records are
/// partially populated rather than rejected so that additional fields can
/// be introduced later. A fixed-width field that is only partially present
/// is still a parse error.
#[derive(Clone, Debug, Hash)]
pub struct Notify<N> {
    rtype: Rtype,
    scheme: Scheme,
    port: u16,
    target: Option<N>,
}

impl Notify<()> {
    /// The rtype of this record data type.
    ///
    /// This is a private type code; it is not assigned by IANA.
    pub const RTYPE: Rtype = Rtype::from_int(0x0F9A);
}

impl<N> Notify<N> {
    /// Creates fully populated record data.
    pub fn new(rtype: Rtype, scheme: Scheme, port: u16, target: N) -> Self {
        Notify {
            rtype,
            scheme,
            port,
            target: Some(target),
        }
    }

    /// The record type the advertisement concerns.
    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    /// The delivery scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The port to deliver to. Zero if the field was absent.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host to deliver to, if the field was present.
    pub fn target(&self) -> Option<&N> {
        self.target.as_ref()
    }

    pub fn into_target(self) -> Option<N> {
        self.target
    }

    pub(super) fn convert_octets<Target: OctetsFrom<N>>(
        self,
    ) -> Result<Notify<Target>, Target::Error> {
        Ok(Notify {
            rtype: self.rtype,
            scheme: self.scheme,
            port: self.port,
            target: match self.target {
                Some(target) => Some(target.try_octets_into()?),
                None => None,
            },
        })
    }

    pub(super) fn flatten<TargetName>(
        self,
    ) -> Result<Notify<TargetName>, N::AppendError>
    where
        N: FlattenInto<TargetName>,
    {
        Ok(Notify {
            rtype: self.rtype,
            scheme: self.scheme,
            port: self.port,
            target: match self.target {
                Some(target) => Some(target.try_flatten_into()?),
                None => None,
            },
        })
    }

    pub fn scan<S: Scanner<Name = N>>(
        scanner: &mut S,
    ) -> Result<Self, S::Error> {
        Ok(Self::new(
            Rtype::scan(scanner)?,
            Scheme::scan(scanner)?,
            u16::scan(scanner)?,
            scanner.scan_name()?,
        ))
    }
}

impl<Octs> Notify<ParsedName<Octs>> {
    pub fn parse<'a, Src: Octets<Range<'a> = Octs> + ?Sized + 'a>(
        parser: &mut Parser<'a, Src>,
    ) -> Result<Self, ParseError> {
        let rtype = Rtype::parse(parser)?;
        if parser.remaining() == 0 {
            return Ok(Notify {
                rtype,
                scheme: Scheme::from_int(0),
                port: 0,
                target: None,
            });
        }
        let scheme = Scheme::parse(parser)?;
        if parser.remaining() == 0 {
            return Ok(Notify {
                rtype,
                scheme,
                port: 0,
                target: None,
            });
        }
        let port = u16::parse(parser)?;
        if parser.remaining() == 0 {
            return Ok(Notify {
                rtype,
                scheme,
                port,
                target: None,
            });
        }
        Ok(Notify {
            rtype,
            scheme,
            port,
            target: Some(ParsedName::parse(parser)?),
        })
    }
}

impl Notify<Name<Bytes>> {
    /// Renders the record data in the generic format of [RFC 3597].
    ///
    /// Useful when configuring the record on a server that does not know
    /// the private mnemonic.
    ///
    /// [RFC 3597]: https://tools.ietf.org/html/rfc3597
    pub fn display_rfc3597(&self) -> impl fmt::Display + '_ {
        Rfc3597Display(self)
    }
}

//--- OctetsFrom and FlattenInto

impl<Name, SrcName> OctetsFrom<Notify<SrcName>> for Notify<Name>
where
    Name: OctetsFrom<SrcName>,
{
    type Error = Name::Error;

    fn try_octets_from(
        source: Notify<SrcName>,
    ) -> Result<Self, Self::Error> {
        source.convert_octets()
    }
}

impl<Name: FlattenInto<TName>, TName> FlattenInto<Notify<TName>>
    for Notify<Name>
{
    type AppendError = Name::AppendError;

    fn try_flatten_into(
        self,
    ) -> Result<Notify<TName>, Name::AppendError> {
        self.flatten()
    }
}

//--- FromStr
//
// The presentation format is the four tokens
// `<rtype> <scheme> <port> <target>`.

impl FromStr for Notify<Name<Bytes>> {
    type Err = ParseNotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let rtype = tokens.next().ok_or(ParseNotifyError::TokenCount)?;
        let scheme = tokens.next().ok_or(ParseNotifyError::TokenCount)?;
        let port = tokens.next().ok_or(ParseNotifyError::TokenCount)?;
        let target = tokens.next().ok_or(ParseNotifyError::TokenCount)?;
        if tokens.next().is_some() {
            return Err(ParseNotifyError::TokenCount);
        }
        let rtype =
            Rtype::from_str(rtype).map_err(|_| ParseNotifyError::Rtype)?;
        let scheme = u8::from_str(scheme)
            .ok()
            .and_then(Scheme::checked_from_int)
            .ok_or(ParseNotifyError::Scheme)?;
        let port =
            u16::from_str(port).map_err(|_| ParseNotifyError::Port)?;
        let target =
            Name::from_str(target).map_err(|_| ParseNotifyError::Target)?;
        Ok(Notify::new(rtype, scheme, port, target))
    }
}

//--- PartialEq and Eq

impl<N, NN> PartialEq<Notify<NN>> for Notify<N>
where
    N: ToName,
    NN: ToName,
{
    fn eq(&self, other: &Notify<NN>) -> bool {
        self.rtype == other.rtype
            && self.scheme == other.scheme
            && self.port == other.port
            && match (&self.target, &other.target) {
                (Some(left), Some(right)) => left.name_eq(right),
                (None, None) => true,
                _ => false,
            }
    }
}

impl<N: ToName> Eq for Notify<N> {}

//--- PartialOrd, Ord, and CanonicalOrd

impl<N, NN> PartialOrd<Notify<NN>> for Notify<N>
where
    N: ToName,
    NN: ToName,
{
    fn partial_cmp(&self, other: &Notify<NN>) -> Option<Ordering> {
        match self.rtype.partial_cmp(&other.rtype) {
            Some(Ordering::Equal) => {}
            other => return other,
        }
        match self.scheme.partial_cmp(&other.scheme) {
            Some(Ordering::Equal) => {}
            other => return other,
        }
        match self.port.partial_cmp(&other.port) {
            Some(Ordering::Equal) => {}
            other => return other,
        }
        match (&self.target, &other.target) {
            (Some(left), Some(right)) => Some(left.name_cmp(right)),
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) => Some(Ordering::Less),
            (Some(_), None) => Some(Ordering::Greater),
        }
    }
}

impl<N: ToName> Ord for Notify<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).expect("total ordering")
    }
}

impl<N: ToName, NN: ToName> CanonicalOrd<Notify<NN>> for Notify<N> {
    fn canonical_cmp(&self, other: &Notify<NN>) -> Ordering {
        match self.rtype.cmp(&other.rtype) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.scheme.cmp(&other.scheme) {
            Ordering::Equal => {}
            other => return other,
        }
        match self.port.cmp(&other.port) {
            Ordering::Equal => {}
            other => return other,
        }
        match (&self.target, &other.target) {
            (Some(left), Some(right)) => {
                left.lowercase_composed_cmp(right)
            }
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }
}

//--- RecordData, ParseRecordData, ComposeRecordData

impl<N> RecordData for Notify<N> {
    fn rtype(&self) -> Rtype {
        Notify::RTYPE
    }
}

impl<'a, Octs: Octets + ?Sized> ParseRecordData<'a, Octs>
    for Notify<ParsedName<Octs::Range<'a>>>
{
    fn parse_rdata(
        rtype: Rtype,
        parser: &mut Parser<'a, Octs>,
    ) -> Result<Option<Self>, ParseError> {
        if rtype == Notify::RTYPE {
            Self::parse(parser).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<Name: ToName> ComposeRecordData for Notify<Name> {
    fn rdlen(&self, _compress: bool) -> Option<u16> {
        // The target name is never compressed.
        Some(match self.target {
            Some(ref target) => target.compose_len() + 5,
            None => 5,
        })
    }

    fn compose_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.compose_head(target)?;
        match self.target {
            Some(ref name) => name.compose(target),
            None => Ok(()),
        }
    }

    fn compose_canonical_rdata<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.compose_head(target)?;
        match self.target {
            Some(ref name) => name.compose_canonical(target),
            None => Ok(()),
        }
    }
}

impl<Name: ToName> Notify<Name> {
    fn compose_head<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.rtype.compose(target)?;
        self.scheme.compose(target)?;
        self.port.compose(target)
    }
}

//--- Display

impl<N: fmt::Display> fmt::Display for Notify<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.rtype, self.scheme, self.port)?;
        if let Some(ref target) = self.target {
            write!(f, " {}", target)?;
        }
        Ok(())
    }
}

//------------ Rfc3597Display ------------------------------------------------

struct Rfc3597Display<'a>(&'a Notify<Name<Bytes>>);

impl fmt::Display for Rfc3597Display<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = Vec::new();
        self.0.compose_rdata(&mut buf).expect("infallible");
        write!(f, "\\# {} ", buf.len())?;
        base16::display(&buf, f)
    }
}

//------------ Scheme --------------------------------------------------------

/// The delivery scheme of a NOTIFY record.
///
/// The scheme selects the mechanism through which synchronization messages
/// are delivered to the advertised target. Two schemes are currently
/// defined. Values outside the known set survive a wire round trip
/// unchanged, but are rejected in presentation data.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Scheme(u8);

impl Scheme {
    /// Notify-style push: a NOTIFY message prompts the target to act.
    pub const NOTIFY: Scheme = Scheme(1);

    /// Authenticated dynamic update delivered directly to the target.
    pub const UPDATE: Scheme = Scheme(2);

    /// Returns a value from its raw integer value.
    #[must_use]
    pub const fn from_int(value: u8) -> Self {
        Scheme(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn to_int(self) -> u8 {
        self.0
    }

    /// Returns the value for a raw integer if it is a known scheme.
    #[must_use]
    pub fn checked_from_int(value: u8) -> Option<Self> {
        match Scheme(value) {
            Scheme::NOTIFY => Some(Scheme::NOTIFY),
            Scheme::UPDATE => Some(Scheme::UPDATE),
            _ => None,
        }
    }

    /// Returns the mnemonic for this value if there is one.
    #[must_use]
    pub const fn to_mnemonic_str(self) -> Option<&'static str> {
        match self {
            Scheme::NOTIFY => Some("NOTIFY"),
            Scheme::UPDATE => Some("UPDATE"),
            _ => None,
        }
    }

    pub fn parse<Octs: AsRef<[u8]> + ?Sized>(
        parser: &mut Parser<'_, Octs>,
    ) -> Result<Self, ParseError> {
        u8::parse(parser).map(Self::from_int)
    }

    pub const COMPOSE_LEN: u16 = 1;

    pub fn compose<Target: Composer + ?Sized>(
        &self,
        target: &mut Target,
    ) -> Result<(), Target::AppendError> {
        self.0.compose(target)
    }

    pub fn scan<S: Scanner>(scanner: &mut S) -> Result<Self, S::Error> {
        let value = u8::scan(scanner)?;
        Self::checked_from_int(value)
            .ok_or_else(|| S::Error::custom("unknown delivery scheme"))
    }
}

//--- From

impl From<Scheme> for u8 {
    fn from(value: Scheme) -> Self {
        value.to_int()
    }
}

//--- FromStr and Display
//
// The presentation format is the raw integer value.

impl str::FromStr for Scheme {
    type Err = ParseNotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u8::from_str(s)
            .ok()
            .and_then(Self::checked_from_int)
            .ok_or(ParseNotifyError::Scheme)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

//------------ ParseNotifyError ----------------------------------------------

/// An error happened while parsing the presentation format of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseNotifyError {
    /// The input did not consist of exactly four tokens.
    TokenCount,

    /// The record type was not recognized.
    Rtype,

    /// The scheme was not an integer or not a known scheme.
    Scheme,

    /// The port was not a valid port number.
    Port,

    /// The target was not a valid domain name.
    Target,
}

impl fmt::Display for ParseNotifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ParseNotifyError::TokenCount => {
                "expected record type, scheme, port, and target"
            }
            ParseNotifyError::Rtype => "unrecognized record type",
            ParseNotifyError::Scheme => "invalid delivery scheme",
            ParseNotifyError::Port => "invalid port",
            ParseNotifyError::Target => "invalid target name",
        })
    }
}

impl std::error::Error for ParseNotifyError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Notify<Name<Bytes>> {
        Notify::new(
            Rtype::CDS,
            Scheme::NOTIFY,
            5300,
            Name::from_str("scanner.example.").unwrap(),
        )
    }

    fn compose(rdata: &Notify<Name<Bytes>>) -> Vec<u8> {
        let mut buf = Vec::new();
        rdata.compose_rdata(&mut buf).unwrap();
        assert_eq!(
            buf.len(),
            usize::from(rdata.rdlen(false).unwrap()),
            "rdlen disagrees with composed length"
        );
        buf
    }

    #[test]
    fn compose_parse() {
        let rdata = sample();
        let buf = compose(&rdata);
        let mut parser = Parser::from_ref(buf.as_slice());
        let parsed = Notify::parse(&mut parser).unwrap();
        assert_eq!(parser.remaining(), 0);
        assert_eq!(rdata, parsed);
    }

    #[test]
    fn parse_truncated() {
        let buf = compose(&sample());

        // Nothing after the record type: only the type is populated.
        let mut parser = Parser::from_ref(&buf[..2]);
        let parsed = Notify::parse(&mut parser).unwrap();
        assert_eq!(parsed.rtype(), Rtype::CDS);
        assert_eq!(parsed.scheme().to_int(), 0);
        assert_eq!(parsed.port(), 0);
        assert!(parsed.target().is_none());

        // Nothing after the scheme.
        let mut parser = Parser::from_ref(&buf[..3]);
        let parsed = Notify::parse(&mut parser).unwrap();
        assert_eq!(parsed.rtype(), Rtype::CDS);
        assert_eq!(parsed.scheme(), Scheme::NOTIFY);
        assert_eq!(parsed.port(), 0);
        assert!(parsed.target().is_none());

        // Nothing after the port.
        let mut parser = Parser::from_ref(&buf[..5]);
        let parsed = Notify::parse(&mut parser).unwrap();
        assert_eq!(parsed.port(), 5300);
        assert!(parsed.target().is_none());
    }

    #[test]
    fn parse_split_field() {
        let buf = compose(&sample());

        // A fixed-width field cut in half is an error, not a partial
        // record.
        let mut parser = Parser::from_ref(&buf[..4]);
        assert!(Notify::parse(&mut parser).is_err());
        let mut parser = Parser::from_ref(&buf[..1]);
        assert!(Notify::parse(&mut parser).is_err());
    }

    #[test]
    fn from_str() {
        let rdata: Notify<Name<Bytes>> =
            "CDS 1 5300 scanner.example.".parse().unwrap();
        assert_eq!(rdata, sample());

        assert_eq!(
            "CDS 1 5300".parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::TokenCount)
        );
        assert_eq!(
            "CDS 1 5300 scanner.example. extra"
                .parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::TokenCount)
        );
        assert_eq!(
            "BLORF 1 5300 scanner.example."
                .parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::Rtype)
        );
        assert_eq!(
            "CDS 7 5300 scanner.example."
                .parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::Scheme)
        );
        assert_eq!(
            "CDS 1 530000 scanner.example."
                .parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::Port)
        );
        assert_eq!(
            "CDS 1 5300 ..bad..".parse::<Notify<Name<Bytes>>>(),
            Err(ParseNotifyError::Target)
        );
    }

    #[test]
    fn display() {
        // Names are displayed without the trailing dot.
        assert_eq!(format!("{}", sample()), "CDS 1 5300 scanner.example");
    }

    #[test]
    fn scheme_values() {
        assert_eq!(Scheme::checked_from_int(1), Some(Scheme::NOTIFY));
        assert_eq!(Scheme::checked_from_int(2), Some(Scheme::UPDATE));
        assert_eq!(Scheme::checked_from_int(3), None);
        assert_eq!(Scheme::NOTIFY.to_mnemonic_str(), Some("NOTIFY"));
        assert_eq!(Scheme::from_int(9).to_mnemonic_str(), None);
    }

    #[test]
    fn rfc3597() {
        let rdata = Notify::new(
            Rtype::NS,
            Scheme::UPDATE,
            53,
            Name::from_str("a.example.").unwrap(),
        );
        // 2 + 1 + 2 octets of fixed fields plus 11 octets of name.
        assert_eq!(
            format!("{}", rdata.display_rfc3597()),
            "\\# 16 00020200350161076578616D706C6500"
        );
    }
}
