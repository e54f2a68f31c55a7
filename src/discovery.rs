//! Finding out where synchronization messages go.
//!
//! A child zone that wants to push delegation changes upward has to
//! answer two questions: who is my parent, and where does the parent
//! want changes delivered? [`parent_zone`] answers the first by walking
//! one label up and probing for a zone cut; [`lookup_target`] answers
//! the second by querying the parent's apex for NOTIFY advertisements
//! and resolving the advertised host to addresses.
//!
//! All queries here talk to unauthenticated third parties, so every one
//! of them runs under a deadline. Signatures on the answers are ignored
//! at this layer; trust is established later when the update itself is
//! signed and verified.

use crate::rdata::{Notify, Scheme};
use crate::{StoredName, StoredRecord};
use core::fmt;
use core::time::Duration;
use domain::base::iana::{Rcode, Rtype};
use domain::base::message::{Message, RecordSection};
use domain::base::name::{FlattenInto, ParsedName, ToName};
use domain::base::MessageBuilder;
use domain::net::client::dgram_stream;
use domain::net::client::protocol::{TcpConnect, UdpConnect};
use domain::net::client::request::{self, RequestMessage, SendRequest};
use domain::net::client::{dgram, multi_stream, stream};
use domain::rdata::AllRecordData;
use domain::resolv::StubResolver;
use octseq::octets::Octets;
use std::error;
use std::net::{IpAddr, SocketAddr};
use std::vec::Vec;
use tracing::{debug, warn};

//------------ DsyncTarget ---------------------------------------------------

/// A resolved delivery target.
///
/// Built fresh for every synchronization attempt; deliberately never
/// cached, so address changes between runs are picked up.
#[derive(Clone, Debug)]
pub struct DsyncTarget {
    /// The advertised host name.
    pub name: StoredName,

    /// Its addresses, in the order delivery should try them.
    pub addresses: Vec<IpAddr>,

    /// The advertised port.
    pub port: u16,
}

impl fmt::Display for DsyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} port {}", self.name, self.port)
    }
}

//------------ ParentZone ----------------------------------------------------

/// The outcome of walking up the tree looking for the parent zone.
#[derive(Clone, Debug)]
pub struct ParentZone {
    /// The parent zone name.
    pub name: StoredName,

    /// Whether a zone marker confirmed the name.
    ///
    /// If false, the name is merely the child with its leftmost label
    /// removed, which is right most of the time but a guess.
    pub confirmed: bool,
}

//------------ parent_zone ---------------------------------------------------

/// Finds the parent zone of `zone`.
///
/// Strips the leftmost label and asks `resolver_addr` for the SOA of the
/// result. A SOA in the answer confirms the candidate itself; one in the
/// authority section names the enclosing zone, which is the parent of a
/// deeper delegation. If the response is unusable the stripped name is
/// returned unconfirmed and a warning logged; the caller decides how
/// much to trust it.
pub async fn parent_zone(
    zone: &StoredName,
    resolver_addr: SocketAddr,
    timeout: Duration,
) -> Result<ParentZone, DiscoveryError> {
    if zone.is_root() {
        return Ok(ParentZone {
            name: zone.clone(),
            confirmed: false,
        });
    }
    let candidate: StoredName =
        zone.parent().expect("non-root name").to_bytes();

    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_rd(true);
    builder.header_mut().set_cd(true);
    let mut builder = builder.question();
    builder
        .push((&candidate, Rtype::SOA))
        .map_err(|_| DiscoveryError::Malformed)?;

    let response =
        exchange(resolver_addr, RequestMessage::new(builder)
            .map_err(|_| DiscoveryError::Malformed)?, timeout)
            .await
            .map_err(DiscoveryError::Query)?;

    match soa_owner(&response) {
        Some(name) => Ok(ParentZone {
            name,
            confirmed: true,
        }),
        None => {
            warn!(
                "failed to locate the parent of {} via answer and \
                 authority; guessing {}",
                zone, candidate
            );
            Ok(ParentZone {
                name: candidate,
                confirmed: false,
            })
        }
    }
}

/// Returns the zone name a SOA response speaks for.
fn soa_owner<Octs: Octets>(message: &Message<Octs>) -> Option<StoredName> {
    // An answer names the zone directly. Take the first record's owner,
    // whatever its type; a CNAME's owner is as good a hint.
    if let Ok(mut answer) = message.answer() {
        if let Some(Ok(record)) = answer.next() {
            return Some(record.owner().to_bytes());
        }
    }
    // Otherwise the authority's SOA names the enclosing zone.
    if let Ok(authority) = message.authority() {
        for record in authority.flatten() {
            if record.rtype() == Rtype::SOA {
                return Some(record.owner().to_bytes());
            }
        }
    }
    None
}

//------------ notify_query --------------------------------------------------

/// Queries a server for the NOTIFY advertisements of a zone.
///
/// Signature records in the answer are skipped, not validated. Records
/// of other types are skipped with a log line.
pub async fn notify_query(
    zone: &StoredName,
    server: SocketAddr,
    timeout: Duration,
) -> Result<Vec<Notify<StoredName>>, DiscoveryError> {
    let mut builder = MessageBuilder::new_vec();
    builder.header_mut().set_rd(true);
    let mut builder = builder.question();
    builder
        .push((zone, Notify::RTYPE))
        .map_err(|_| DiscoveryError::Malformed)?;

    let response =
        exchange(server, RequestMessage::new(builder)
            .map_err(|_| DiscoveryError::Malformed)?, timeout)
            .await
            .map_err(DiscoveryError::Query)?;
    let rcode = response.header().rcode();
    if rcode != Rcode::NOERROR {
        return Err(DiscoveryError::ErrorResponse(rcode));
    }

    let mut advertisements = Vec::new();
    let answer =
        response.answer().map_err(|_| DiscoveryError::Malformed)?;
    for record in answer {
        let record = record.map_err(|_| DiscoveryError::Malformed)?;
        match record.rtype() {
            Rtype::RRSIG | Rtype::SIG => continue,
            rtype if rtype == Notify::RTYPE => {
                let record = record
                    .to_record::<Notify<ParsedName<_>>>()
                    .map_err(|_| DiscoveryError::Malformed)?
                    .ok_or(DiscoveryError::Malformed)?;
                advertisements.push(
                    record
                        .into_data()
                        .try_flatten_into()
                        .map_err(|_| DiscoveryError::Malformed)?,
                );
            }
            rtype => {
                debug!(
                    "ignoring {} record in NOTIFY answer for {}",
                    rtype, zone
                );
            }
        }
    }
    Ok(advertisements)
}

//------------ auth_query ----------------------------------------------------

/// Queries a server for an RRset, checking all message sections.
///
/// The answer section is authoritative for the RRset; failing that, the
/// authority and additional sections are searched for records of the
/// right type at exactly the queried name, which is where delegation NS
/// and glue show up when asking a parent. Signature records are skipped.
pub async fn auth_query(
    owner: &StoredName,
    server: SocketAddr,
    rtype: Rtype,
    timeout: Duration,
) -> Result<Vec<StoredRecord>, DiscoveryError> {
    let mut builder = MessageBuilder::new_vec();
    let mut builder = builder.question();
    builder
        .push((owner, rtype))
        .map_err(|_| DiscoveryError::Malformed)?;

    let response =
        exchange(server, RequestMessage::new(builder)
            .map_err(|_| DiscoveryError::Malformed)?, timeout)
            .await
            .map_err(DiscoveryError::Query)?;
    let rcode = response.header().rcode();
    if rcode != Rcode::NOERROR {
        return Err(DiscoveryError::ErrorResponse(rcode));
    }

    let records = matching_records(
        response.answer().map_err(|_| DiscoveryError::Malformed)?,
        rtype,
        None,
    )?;
    if !records.is_empty() {
        return Ok(records);
    }

    let records = matching_records(
        response
            .authority()
            .map_err(|_| DiscoveryError::Malformed)?,
        rtype,
        Some(owner),
    )?;
    if !records.is_empty() {
        return Ok(records);
    }

    matching_records(
        response
            .additional()
            .map_err(|_| DiscoveryError::Malformed)?,
        rtype,
        Some(owner),
    )
}

/// Collects the records of a section matching a type and optional owner.
fn matching_records<'a>(
    section: RecordSection<'a, bytes::Bytes>,
    rtype: Rtype,
    owner: Option<&StoredName>,
) -> Result<Vec<StoredRecord>, DiscoveryError> {
    let mut records = Vec::new();
    for record in section {
        let record = record.map_err(|_| DiscoveryError::Malformed)?;
        if record.rtype() != rtype {
            continue;
        }
        if let Some(owner) = owner {
            if !record.owner().name_eq(owner) {
                continue;
            }
        }
        let record = record
            .to_record::<AllRecordData<_, ParsedName<_>>>()
            .map_err(|_| DiscoveryError::Malformed)?
            .ok_or(DiscoveryError::Malformed)?;
        records.push(
            record
                .try_flatten_into()
                .map_err(|_| DiscoveryError::Malformed)?,
        );
    }
    Ok(records)
}

//------------ lookup_target -------------------------------------------------

/// Finds the delivery target for a record type and scheme.
///
/// Queries `server` for the advertisements of `zone`, picks the one
/// matching `rtype` and `scheme`, and resolves its host. Exactly one
/// advertisement has to match: none is a not-found error, several are an
/// advertising-side configuration mistake we refuse to guess about.
pub async fn lookup_target(
    zone: &StoredName,
    server: SocketAddr,
    rtype: Rtype,
    scheme: Scheme,
    resolver: &StubResolver,
    timeout: Duration,
) -> Result<DsyncTarget, DiscoveryError> {
    let advertisements = notify_query(zone, server, timeout).await?;
    let advertisement =
        select_advertisement(&advertisements, rtype, scheme)?;
    let name = advertisement
        .target()
        .ok_or(DiscoveryError::BadAdvertisement)?;

    let found = resolver
        .lookup_host(name)
        .await
        .map_err(DiscoveryError::Resolve)?;
    let addresses: Vec<IpAddr> = found.iter().collect();
    if addresses.is_empty() {
        return Err(DiscoveryError::NoAddresses(name.clone()));
    }
    debug!(
        "delivery target for {} is {} at {:?} port {}",
        zone,
        name,
        addresses,
        advertisement.port()
    );
    Ok(DsyncTarget {
        name: name.clone(),
        addresses,
        port: advertisement.port(),
    })
}

/// Picks the single advertisement matching a record type and scheme.
pub fn select_advertisement<'a>(
    advertisements: &'a [Notify<StoredName>],
    rtype: Rtype,
    scheme: Scheme,
) -> Result<&'a Notify<StoredName>, DiscoveryError> {
    let mut matches = advertisements
        .iter()
        .filter(|n| n.rtype() == rtype && n.scheme() == scheme);
    let first = matches
        .next()
        .ok_or(DiscoveryError::NoMatch { rtype, scheme })?;
    if matches.next().is_some() {
        return Err(DiscoveryError::Ambiguous { rtype, scheme });
    }
    Ok(first)
}

//------------ exchange ------------------------------------------------------

/// Sends one request to one server and waits for the response.
///
/// UDP first with fallback to TCP on truncation, a fresh connection per
/// call, and a hard deadline on the whole exchange.
pub(crate) async fn exchange(
    server: SocketAddr,
    request: RequestMessage<Vec<u8>>,
    timeout: Duration,
) -> Result<Message<bytes::Bytes>, QueryError> {
    let mut dgram_config = dgram::Config::new();
    dgram_config.set_read_timeout(timeout);
    dgram_config.set_max_retries(1);
    let mut stream_config = stream::Config::new();
    stream_config.set_response_timeout(timeout);
    let config = dgram_stream::Config::from_parts(
        dgram_config,
        multi_stream::Config::from(stream_config),
    );

    let (conn, transport) = dgram_stream::Connection::with_config(
        UdpConnect::new(server),
        TcpConnect::new(server),
        config,
    );
    tokio::spawn(async move {
        transport.run().await;
    });

    let mut request = conn.send_request(request);
    match tokio::time::timeout(timeout, request.get_response()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(QueryError::Request(err)),
        Err(_) => Err(QueryError::Timeout),
    }
}

/// Sends one message byte-exact and waits for the response.
///
/// The regular client transports rebuild the message on the way out,
/// which is fine for queries but fatal for a message carrying a SIG(0)
/// record: the signature covers the exact bytes. Signed messages go
/// through here instead, UDP first and TCP when the answer comes back
/// truncated.
pub(crate) async fn exchange_raw(
    server: SocketAddr,
    message: &Message<Vec<u8>>,
    timeout: Duration,
) -> Result<Message<bytes::Bytes>, QueryError> {
    match tokio::time::timeout(timeout, exchange_raw_inner(server, message))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout),
    }
}

async fn exchange_raw_inner(
    server: SocketAddr,
    message: &Message<Vec<u8>>,
) -> Result<Message<bytes::Bytes>, QueryError> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let local: SocketAddr = if server.is_ipv4() {
        ([0u8; 4], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let sock = tokio::net::UdpSocket::bind(local)
        .await
        .map_err(QueryError::Io)?;
    sock.connect(server).await.map_err(QueryError::Io)?;
    sock.send(message.as_slice())
        .await
        .map_err(QueryError::Io)?;

    let mut buf = vec![0u8; 0xFFFF];
    let response = loop {
        let len = sock.recv(&mut buf).await.map_err(QueryError::Io)?;
        let octets = bytes::Bytes::copy_from_slice(&buf[..len]);
        let Ok(response) = Message::from_octets(octets) else {
            continue;
        };
        if response.header().id() == message.header().id()
            && response.header().qr()
        {
            break response;
        }
        // Not ours; keep waiting within the deadline.
    };
    if !response.header().tc() {
        return Ok(response);
    }

    // Truncated; retry the exchange over TCP.
    let mut stream = tokio::net::TcpStream::connect(server)
        .await
        .map_err(QueryError::Io)?;
    let len = u16::try_from(message.as_slice().len())
        .map_err(|_| QueryError::Io(std::io::ErrorKind::InvalidInput.into()))?;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(QueryError::Io)?;
    stream
        .write_all(message.as_slice())
        .await
        .map_err(QueryError::Io)?;

    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(QueryError::Io)?;
    let mut buf = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    stream.read_exact(&mut buf).await.map_err(QueryError::Io)?;
    Message::from_octets(bytes::Bytes::from(buf))
        .map_err(|_| QueryError::ShortResponse)
}

//============ Error Types ===================================================

//------------ QueryError ----------------------------------------------------

/// A single outbound query failed.
#[derive(Debug)]
pub enum QueryError {
    /// The deadline passed without a response.
    Timeout,

    /// The transport reported an error.
    Request(request::Error),

    /// A socket operation failed.
    Io(std::io::Error),

    /// The response is too short to be a DNS message.
    ShortResponse,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryError::Timeout => f.write_str("query timed out"),
            QueryError::Request(err) => err.fmt(f),
            QueryError::Io(err) => err.fmt(f),
            QueryError::ShortResponse => {
                f.write_str("short response message")
            }
        }
    }
}

impl error::Error for QueryError {}

//------------ DiscoveryError ------------------------------------------------

/// Discovery could not produce a usable result.
#[derive(Debug)]
pub enum DiscoveryError {
    /// The query itself failed.
    Query(QueryError),

    /// The server answered with a non-success rcode.
    ErrorResponse(Rcode),

    /// A response could not be interpreted.
    Malformed,

    /// No advertisement matches the record type and scheme.
    NoMatch { rtype: Rtype, scheme: Scheme },

    /// More than one advertisement matches; the advertising side is
    /// misconfigured and picking one silently would hide that.
    Ambiguous { rtype: Rtype, scheme: Scheme },

    /// The advertisement lacks a target host.
    BadAdvertisement,

    /// Resolving the target host failed.
    Resolve(std::io::Error),

    /// The target host has no addresses.
    NoAddresses(StoredName),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiscoveryError::Query(err) => err.fmt(f),
            DiscoveryError::ErrorResponse(rcode) => {
                write!(f, "server answered with {}", rcode)
            }
            DiscoveryError::Malformed => {
                f.write_str("malformed response")
            }
            DiscoveryError::NoMatch { rtype, scheme } => {
                write!(
                    f,
                    "no advertisement for type {} scheme {}",
                    rtype, scheme
                )
            }
            DiscoveryError::Ambiguous { rtype, scheme } => {
                write!(
                    f,
                    "conflicting advertisements for type {} scheme {}",
                    rtype, scheme
                )
            }
            DiscoveryError::BadAdvertisement => {
                f.write_str("advertisement lacks a target")
            }
            DiscoveryError::Resolve(err) => {
                write!(f, "resolving target failed: {}", err)
            }
            DiscoveryError::NoAddresses(name) => {
                write!(f, "{} has no addresses", name)
            }
        }
    }
}

impl error::Error for DiscoveryError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::{Record, Serial, Ttl};
    use domain::rdata::Soa;
    use std::str::FromStr;

    fn name(name: &str) -> StoredName {
        StoredName::from_str(name).unwrap()
    }

    fn advertisement(
        rtype: Rtype,
        scheme: Scheme,
        port: u16,
    ) -> Notify<StoredName> {
        Notify::new(rtype, scheme, port, name("sync.example."))
    }

    #[test]
    fn select_single_match() {
        let ads = vec![
            advertisement(Rtype::CDS, Scheme::NOTIFY, 5300),
            advertisement(Rtype::ANY, Scheme::UPDATE, 53),
        ];
        let picked =
            select_advertisement(&ads, Rtype::ANY, Scheme::UPDATE)
                .unwrap();
        assert_eq!(picked.port(), 53);
    }

    #[test]
    fn select_no_match() {
        let ads = vec![advertisement(Rtype::CDS, Scheme::NOTIFY, 5300)];
        assert!(matches!(
            select_advertisement(&ads, Rtype::NS, Scheme::UPDATE),
            Err(DiscoveryError::NoMatch { .. })
        ));
    }

    #[test]
    fn select_ambiguous() {
        let ads = vec![
            advertisement(Rtype::ANY, Scheme::UPDATE, 53),
            advertisement(Rtype::ANY, Scheme::UPDATE, 5353),
        ];
        assert!(matches!(
            select_advertisement(&ads, Rtype::ANY, Scheme::UPDATE),
            Err(DiscoveryError::Ambiguous { .. })
        ));
    }

    fn soa() -> Soa<StoredName> {
        Soa::new(
            name("ns1.example."),
            name("hostmaster.example."),
            Serial(1),
            Ttl::from_secs(3600),
            Ttl::from_secs(900),
            Ttl::from_secs(86400),
            Ttl::from_secs(300),
        )
    }

    #[test]
    fn soa_owner_from_answer() {
        let mut builder = MessageBuilder::new_vec().answer();
        builder
            .push(Record::new(
                name("example."),
                Class::IN,
                Ttl::from_secs(3600),
                soa(),
            ))
            .unwrap();
        let message = builder.into_message();
        assert_eq!(soa_owner(&message), Some(name("example.")));
    }

    #[test]
    fn soa_owner_from_authority() {
        let mut builder =
            MessageBuilder::new_vec().answer().authority();
        builder
            .push(Record::new(
                name("example."),
                Class::IN,
                Ttl::from_secs(3600),
                soa(),
            ))
            .unwrap();
        let message = builder.into_message();
        assert_eq!(soa_owner(&message), Some(name("example.")));
    }

    #[test]
    fn soa_owner_empty_response() {
        let message = MessageBuilder::new_vec().into_message();
        assert_eq!(soa_owner(&message), None);
    }

    #[test]
    fn candidate_parent_is_one_label_up() {
        let child = name("child.example.");
        let parent: StoredName =
            child.parent().unwrap().to_bytes();
        assert_eq!(parent, name("example."));
    }
}
