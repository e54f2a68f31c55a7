//! Signing and verifying messages with SIG(0).
//!
//! A transaction signature authenticates a whole DNS message rather than
//! an RRset: the sender appends a single SIG record with type covered
//! zero as the last record of the additional section, carrying a
//! signature over the message as it stood before the record was added.
//! The signature is bound to a short validity window so captured
//! messages cannot be replayed later.
//!
//! [`sign_message`] is used by the client side before transmitting an
//! update; [`verify_message`] by the server side before acting on one.
//! Verification fails closed: every way a message can be unacceptable
//! maps to a distinct [`VerifyError`].
//!
//! Window timestamps are 32-bit wall-clock seconds compared with the
//! serial arithmetic of [RFC 1982], so verification keeps working across
//! the wrap of the timestamp space.
//!
//! [RFC 1982]: https://tools.ietf.org/html/rfc1982

use crate::keys::{ecdsa_public_point, rsa_exponent_modulus, SigningKey, TrustedKeys};
use crate::rdata::{Key, ProtoSig, Sig};
use bytes::Bytes;
use core::fmt;
use core::time::Duration;
use domain::base::iana::{Class, Rtype, SecAlg};
use domain::base::message::Message;
use domain::base::message_builder::AdditionalBuilder;
use domain::base::name::{Name, ParsedName, ToName};
use domain::base::record::{ParsedRecord, Record};
use domain::base::Ttl;
use domain::rdata::dnssec::Timestamp;
use octseq::parse::Parser;
use ring::signature;
use std::error;
use std::vec::Vec;

/// Clock skew allowance on both ends of a signature validity window.
const VALIDITY_JITTER: u32 = 60;

/// The TTL of the SIG record. Meaningless, but fill in something sane.
const SIG_TTL: Ttl = Ttl::from_secs(300);

//------------ sign_message --------------------------------------------------

/// Signs a message, appending the SIG(0) record.
///
/// The signature is valid from `validity` before a minute ago until
/// `validity` plus a minute from now, the minute on each end covering
/// clock skew between the parties.
pub fn sign_message(
    builder: AdditionalBuilder<Vec<u8>>,
    key: &SigningKey,
    validity: Duration,
) -> Result<Message<Vec<u8>>, SignMessageError> {
    let now = Timestamp::now().into_int();
    let inception = Timestamp::from(now.wrapping_sub(VALIDITY_JITTER));
    let expiration = Timestamp::from(
        now.wrapping_add(validity.as_secs() as u32)
            .wrapping_add(VALIDITY_JITTER),
    );
    sign_message_at(builder, key, inception, expiration)
}

/// Signs a message with an explicit validity window.
pub fn sign_message_at(
    mut builder: AdditionalBuilder<Vec<u8>>,
    key: &SigningKey,
    inception: Timestamp,
    expiration: Timestamp,
) -> Result<Message<Vec<u8>>, SignMessageError> {
    let proto = ProtoSig::sig0(
        key.algorithm(),
        expiration,
        inception,
        key.key_tag(),
        key.name().clone(),
    );

    // RFC 2931: the signature covers the SIG rdata with an empty
    // signature field, followed by the message without the SIG record.
    let mut signed = Vec::new();
    proto.compose(&mut signed).expect("infallible");
    signed.extend_from_slice(builder.as_slice());

    let signature =
        key.sign(&signed).map_err(|_| SignMessageError::Signing)?;
    let sig = proto
        .into_sig(signature)
        .map_err(|_| SignMessageError::Append)?;

    builder
        .push(Record::new(key.name().clone(), Class::IN, SIG_TTL, sig))
        .map_err(|_| SignMessageError::Append)?;
    Ok(builder.into_message())
}

//------------ verify_message ------------------------------------------------

/// Verifies the SIG(0) signature of a message.
///
/// Returns the authenticated signer name. The trusted key set is only
/// read, never changed.
pub fn verify_message<Octs: AsRef<[u8]>>(
    message: &Message<Octs>,
    trusted: &TrustedKeys,
) -> Result<Name<Bytes>, VerifyError> {
    verify_message_at(message, trusted, Timestamp::now())
}

/// Verifies the SIG(0) signature of a message at a given point in time.
pub fn verify_message_at<Octs: AsRef<[u8]>>(
    message: &Message<Octs>,
    trusted: &TrustedKeys,
    now: Timestamp,
) -> Result<Name<Bytes>, VerifyError> {
    let (prefix, sig) = split_signed(message.as_slice())?;
    let sig = sig.data();

    if sig.type_covered() != Rtype::from_int(0) {
        return Err(VerifyError::Malformed);
    }

    let signer = sig.signer_name().to_bytes();
    let key = trusted.get(&signer).ok_or(VerifyError::UnknownKey)?;
    if sig.key_tag() != key.key_tag() {
        return Err(VerifyError::UnknownKey);
    }
    if sig.algorithm() != key.algorithm() {
        return Err(VerifyError::BadAlgorithm);
    }

    // RFC 1982 comparison; incomparable values fail the window check.
    if !(sig.inception() <= now && now <= sig.expiration()) {
        return Err(VerifyError::BadTime);
    }

    let mut signed = Vec::new();
    sig.proto().compose(&mut signed).expect("infallible");
    signed.extend_from_slice(&prefix);

    verify_signature(key, &signed, sig.signature().as_ref())?;
    Ok(signer)
}

/// Checks a raw signature over `signed` against a public key.
fn verify_signature(
    key: &Key<Bytes>,
    signed: &[u8],
    sig: &[u8],
) -> Result<(), VerifyError> {
    match key.algorithm() {
        SecAlg::RSASHA256 | SecAlg::RSASHA512 => {
            let algorithm = match key.algorithm() {
                SecAlg::RSASHA256 => {
                    &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY
                }
                _ => {
                    &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY
                }
            };
            let (e, n) = rsa_exponent_modulus(key)
                .map_err(|_| VerifyError::BadAlgorithm)?;
            signature::RsaPublicKeyComponents { n, e }
                .verify(algorithm, signed, sig)
                .map_err(|_| VerifyError::BadSignature)
        }
        SecAlg::ECDSAP256SHA256 | SecAlg::ECDSAP384SHA384 => {
            let algorithm = match key.algorithm() {
                SecAlg::ECDSAP256SHA256 => {
                    &signature::ECDSA_P256_SHA256_FIXED
                }
                _ => &signature::ECDSA_P384_SHA384_FIXED,
            };
            // Ring wants the uncompressed-point marker the rdata omits.
            let public_key = ecdsa_public_point(key);
            signature::UnparsedPublicKey::new(algorithm, &public_key)
                .verify(signed, sig)
                .map_err(|_| VerifyError::BadSignature)
        }
        SecAlg::ED25519 => {
            let public_key = key.public_key();
            signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
                .verify(signed, sig)
                .map_err(|_| VerifyError::BadSignature)
        }
        _ => Err(VerifyError::BadAlgorithm),
    }
}

//------------ split_signed --------------------------------------------------

type ParsedSig<'a> = Record<ParsedName<&'a [u8]>, Sig<&'a [u8], ParsedName<&'a [u8]>>>;

/// Splits a message into the bytes that were signed and its SIG record.
///
/// The SIG record must be the last record of the message and the only
/// SIG in the additional section. The returned prefix is the message
/// without the record and with the additional count adjusted, i.e., the
/// bytes the signer saw.
fn split_signed(msg: &[u8]) -> Result<(Vec<u8>, ParsedSig<'_>), VerifyError> {
    let message =
        Message::from_octets(msg).map_err(|_| VerifyError::Malformed)?;
    let counts = message.header_counts();
    let arcount = counts.arcount();
    if arcount == 0 {
        return Err(VerifyError::Unsigned);
    }

    let mut parser = Parser::from_ref(msg);
    parser.advance(12).map_err(|_| VerifyError::Malformed)?;
    for _ in 0..counts.qdcount() {
        ParsedName::parse(&mut parser)
            .map_err(|_| VerifyError::Malformed)?;
        parser.advance(4).map_err(|_| VerifyError::Malformed)?;
    }
    for _ in 0..u32::from(counts.ancount()) + u32::from(counts.nscount()) {
        ParsedRecord::parse(&mut parser)
            .map_err(|_| VerifyError::Malformed)?;
    }
    for _ in 0..arcount - 1 {
        let record = ParsedRecord::parse(&mut parser)
            .map_err(|_| VerifyError::Malformed)?;
        if record.rtype() == Rtype::SIG {
            // More than one signature envelope.
            return Err(VerifyError::Malformed);
        }
    }

    let pos = parser.pos();
    let record = ParsedRecord::parse(&mut parser)
        .map_err(|_| VerifyError::Malformed)?;
    if parser.remaining() != 0 {
        return Err(VerifyError::Malformed);
    }
    if record.rtype() != Rtype::SIG {
        return Err(VerifyError::Unsigned);
    }
    let sig = record
        .into_record()
        .map_err(|_| VerifyError::Malformed)?
        .ok_or(VerifyError::Malformed)?;

    let mut prefix = msg[..pos].to_vec();
    prefix[10..12].copy_from_slice(&(arcount - 1).to_be_bytes());
    Ok((prefix, sig))
}

//============ Error Types ===================================================

//------------ SignMessageError ----------------------------------------------

/// Signing a message failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignMessageError {
    /// The cryptographic operation failed.
    Signing,

    /// The SIG record did not fit the message.
    Append,
}

impl fmt::Display for SignMessageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SignMessageError::Signing => "signing failed",
            SignMessageError::Append => {
                "signature record does not fit message"
            }
        })
    }
}

impl error::Error for SignMessageError {}

//------------ VerifyError ---------------------------------------------------

/// A message failed SIG(0) verification.
///
/// Each way a message can fail gets its own variant so the dispatcher
/// can answer and log the precise reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyError {
    /// The message carries no signature envelope.
    Unsigned,

    /// The message or its signature envelope cannot be interpreted, or
    /// there is more than one envelope.
    Malformed,

    /// The signer is not in the trusted key set, or the key tag does
    /// not match its key.
    UnknownKey,

    /// The signature algorithm is not supported or contradicts the key.
    BadAlgorithm,

    /// The cryptographic signature does not check out.
    BadSignature,

    /// The verification time is outside the validity window.
    BadTime,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            VerifyError::Unsigned => "message is not signed",
            VerifyError::Malformed => "malformed signature envelope",
            VerifyError::UnknownKey => "unknown signer key",
            VerifyError::BadAlgorithm => "unsupported algorithm",
            VerifyError::BadSignature => "bad signature",
            VerifyError::BadTime => "signature outside validity window",
        })
    }
}

impl error::Error for VerifyError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::keys::KeyPair;
    use domain::base::iana::Opcode;
    use domain::base::MessageBuilder;
    use ring::signature::Ed25519KeyPair;
    use std::str::FromStr;

    fn test_key(name: &str) -> SigningKey {
        let pair =
            Ed25519KeyPair::from_seed_unchecked(&[7u8; 32]).unwrap();
        let public = Bytes::copy_from_slice(pair.public_key().as_ref());
        let key = Key::new(512, 3, SecAlg::ED25519, public).unwrap();
        SigningKey::new(
            Name::from_str(name).unwrap(),
            key,
            KeyPair::Ed25519(pair),
        )
        .unwrap()
    }

    fn trusted(key: &SigningKey) -> TrustedKeys {
        let mut keys = TrustedKeys::new();
        keys.insert(key.name().clone(), key.key().clone());
        keys
    }

    fn test_update() -> AdditionalBuilder<Vec<u8>> {
        let mut builder = MessageBuilder::new_vec();
        builder.header_mut().set_opcode(Opcode::UPDATE);
        builder.header_mut().set_id(4711);
        let mut builder = builder.question();
        builder
            .push((
                Name::<Vec<u8>>::from_str("example.").unwrap(),
                Rtype::SOA,
            ))
            .unwrap();
        builder.additional()
    }

    #[test]
    fn sign_and_verify() {
        let key = test_key("child.example.");
        let msg =
            sign_message(test_update(), &key, Duration::from_secs(300))
                .unwrap();
        let signer = verify_message(&msg, &trusted(&key)).unwrap();
        assert_eq!(signer, key.name().clone());
    }

    #[test]
    fn unsigned_message() {
        let msg = test_update().into_message();
        assert_eq!(
            verify_message(&msg, &trusted(&test_key("child.example."))),
            Err(VerifyError::Unsigned)
        );
    }

    #[test]
    fn unknown_signer() {
        let key = test_key("child.example.");
        let msg =
            sign_message(test_update(), &key, Duration::from_secs(300))
                .unwrap();
        assert_eq!(
            verify_message(&msg, &TrustedKeys::new()),
            Err(VerifyError::UnknownKey)
        );
    }

    #[test]
    fn tampered_message() {
        let key = test_key("child.example.");
        let msg =
            sign_message(test_update(), &key, Duration::from_secs(300))
                .unwrap();
        let mut octets = msg.as_octets().clone();
        // Flip the message id.
        octets[0] ^= 0xff;
        let msg = Message::from_octets(octets).unwrap();
        assert_eq!(
            verify_message(&msg, &trusted(&key)),
            Err(VerifyError::BadSignature)
        );
    }

    #[test]
    fn double_signature() {
        let key = test_key("child.example.");
        let msg =
            sign_message(test_update(), &key, Duration::from_secs(300))
                .unwrap();
        // Splice a second copy of the SIG record in: two envelopes,
        // reject.
        let octets = msg.as_slice();
        let (prefix, _) = split_signed(octets).unwrap();
        let sig_bytes = &octets[prefix.len()..];
        let mut doubled = octets.to_vec();
        doubled.extend_from_slice(sig_bytes);
        doubled[10..12].copy_from_slice(&2u16.to_be_bytes());
        let msg = Message::from_octets(doubled).unwrap();
        assert_eq!(
            verify_message(&msg, &trusted(&key)),
            Err(VerifyError::Malformed)
        );
    }

    #[test]
    fn validity_window() {
        let key = test_key("child.example.");
        let now = Timestamp::now().into_int();

        // Inception ten seconds ago, expiration in five minutes: valid.
        let msg = sign_message_at(
            test_update(),
            &key,
            Timestamp::from(now - 10),
            Timestamp::from(now + 300),
        )
        .unwrap();
        assert!(verify_message(&msg, &trusted(&key)).is_ok());

        // Expired one second ago.
        let msg = sign_message_at(
            test_update(),
            &key,
            Timestamp::from(now - 300),
            Timestamp::from(now - 1),
        )
        .unwrap();
        assert_eq!(
            verify_message(&msg, &trusted(&key)),
            Err(VerifyError::BadTime)
        );

        // Not yet valid.
        let msg = sign_message_at(
            test_update(),
            &key,
            Timestamp::from(now + 60),
            Timestamp::from(now + 300),
        )
        .unwrap();
        assert_eq!(
            verify_message(&msg, &trusted(&key)),
            Err(VerifyError::BadTime)
        );
    }

    #[test]
    fn validity_window_wraps() {
        let key = test_key("child.example.");
        let keys = trusted(&key);

        // A window that straddles the 32-bit wrap is fine under serial
        // arithmetic; a naive integer comparison would reject it.
        let msg = sign_message_at(
            test_update(),
            &key,
            Timestamp::from(u32::MAX - 30),
            Timestamp::from(270),
        )
        .unwrap();
        assert!(verify_message_at(
            &msg,
            &keys,
            Timestamp::from(u32::MAX)
        )
        .is_ok());
        assert!(
            verify_message_at(&msg, &keys, Timestamp::from(100)).is_ok()
        );
        assert_eq!(
            verify_message_at(&msg, &keys, Timestamp::from(600)),
            Err(VerifyError::BadTime)
        );
    }
}
