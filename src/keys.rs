//! Key material for signing and verifying updates.
//!
//! Signing keys live on disk as the conventional file pair produced by
//! `dnssec-keygen -T KEY`: a `.key` file holding the public KEY record in
//! zone-file syntax and a `.private` file holding the secret values in the
//! line-oriented format popularized by BIND. [`SigningKey::load`] reads
//! such a pair and turns it into a `ring`-backed key pair.
//!
//! The verifying side only needs the public halves: [`read_public_keys`]
//! loads every `.key` file of a directory into a [`TrustedKeys`] map that
//! the server consults by signer name.

use crate::rdata::Key;
use bytes::Bytes;
use core::fmt;
use core::str::FromStr;
use domain::base::iana::SecAlg;
use domain::base::name::Name;
use domain::utils::base64;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair as _, RsaKeyPair,
};
use std::boxed::Box;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::string::String;
use std::vec::Vec;
use std::{error, io};
use tracing::debug;

//------------ SigningKey ----------------------------------------------------

/// A private key together with its published KEY record.
pub struct SigningKey {
    name: Name<Bytes>,
    key: Key<Bytes>,
    key_tag: u16,
    pair: KeyPair,
}

impl SigningKey {
    /// Creates a signing key from its parts.
    ///
    /// The KEY record and the key pair must use the same algorithm.
    pub fn new(
        name: Name<Bytes>,
        key: Key<Bytes>,
        pair: KeyPair,
    ) -> Result<Self, KeyError> {
        if key.algorithm() != pair.algorithm() {
            return Err(KeyError::KeyMismatch);
        }
        let key_tag = key.key_tag();
        Ok(SigningKey {
            name,
            key,
            key_tag,
            pair,
        })
    }

    /// Loads a signing key from a BIND-style key file pair.
    ///
    /// `path` may point at either the `.key` or the `.private` file; the
    /// other file of the pair is derived from it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let (pubfile, privfile) = match path.extension() {
            Some(ext) if ext == "key" => {
                (path.to_path_buf(), path.with_extension("private"))
            }
            Some(ext) if ext == "private" => {
                (path.with_extension("key"), path.to_path_buf())
            }
            _ => return Err(KeyError::FileName(path.to_path_buf())),
        };

        let public = std::fs::read_to_string(&pubfile)
            .map_err(|err| KeyError::Io(pubfile.clone(), err))?;
        let (name, key) = parse_key_file(&public)?;

        let secret = std::fs::read_to_string(&privfile)
            .map_err(|err| KeyError::Io(privfile.clone(), err))?;
        let secret = SecretKeyBytes::parse_from_bind(&secret)?;

        let pair = KeyPair::from_bytes(&secret, &key)?;
        Self::new(name, key, pair)
    }

    /// The owner name of the KEY record, i.e., the signer identity.
    pub fn name(&self) -> &Name<Bytes> {
        &self.name
    }

    /// The public KEY record.
    pub fn key(&self) -> &Key<Bytes> {
        &self.key
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn algorithm(&self) -> SecAlg {
        self.pair.algorithm()
    }

    /// Signs `data`, returning the raw signature.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError> {
        self.pair.sign(data)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("name", &self.name)
            .field("key_tag", &self.key_tag)
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

//------------ KeyPair -------------------------------------------------------

/// A key pair backed by `ring`.
//
// Note: ring does not implement Clone for its key pair types.
pub enum KeyPair {
    /// An RSA/SHA-256 key pair.
    RsaSha256 { key: RsaKeyPair, rng: SystemRandom },

    /// An RSA/SHA-512 key pair.
    RsaSha512 { key: RsaKeyPair, rng: SystemRandom },

    /// An ECDSA P-256/SHA-256 key pair.
    EcdsaP256Sha256 { key: EcdsaKeyPair, rng: SystemRandom },

    /// An ECDSA P-384/SHA-384 key pair.
    EcdsaP384Sha384 { key: EcdsaKeyPair, rng: SystemRandom },

    /// An Ed25519 key pair.
    Ed25519(Ed25519KeyPair),
}

impl KeyPair {
    /// Imports a key pair from secret bytes and the published KEY record.
    pub fn from_bytes(
        secret: &SecretKeyBytes,
        public: &Key<impl AsRef<[u8]>>,
    ) -> Result<Self, KeyError> {
        if secret.algorithm() != public.algorithm() {
            return Err(KeyError::KeyMismatch);
        }
        let rng = SystemRandom::new();
        match secret {
            SecretKeyBytes::RsaSha256(s) | SecretKeyBytes::RsaSha512(s) => {
                // The KEY rdata holds the exponent and modulus; make sure
                // they belong to the secret values.
                let (e, n) = rsa_exponent_modulus(public)?;
                if e != s.e.as_ref() || n != s.n.as_ref() {
                    return Err(KeyError::KeyMismatch);
                }

                let components = ring::rsa::KeyPairComponents {
                    public_key: ring::rsa::PublicKeyComponents {
                        n: s.n.as_ref(),
                        e: s.e.as_ref(),
                    },
                    d: s.d.as_ref(),
                    p: s.p.as_ref(),
                    q: s.q.as_ref(),
                    dP: s.d_p.as_ref(),
                    dQ: s.d_q.as_ref(),
                    qInv: s.q_i.as_ref(),
                };
                let key = RsaKeyPair::from_components(&components)
                    .map_err(|_| KeyError::KeyMismatch)?;
                Ok(match secret {
                    SecretKeyBytes::RsaSha256(_) => {
                        KeyPair::RsaSha256 { key, rng }
                    }
                    _ => KeyPair::RsaSha512 { key, rng },
                })
            }

            SecretKeyBytes::EcdsaP256Sha256(s) => {
                let public_key = ecdsa_public_point(public);
                EcdsaKeyPair::from_private_key_and_public_key(
                    &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                    s.as_ref(),
                    &public_key,
                    &rng,
                )
                .map_err(|_| KeyError::KeyMismatch)
                .map(|key| KeyPair::EcdsaP256Sha256 { key, rng })
            }

            SecretKeyBytes::EcdsaP384Sha384(s) => {
                let public_key = ecdsa_public_point(public);
                EcdsaKeyPair::from_private_key_and_public_key(
                    &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
                    s.as_ref(),
                    &public_key,
                    &rng,
                )
                .map_err(|_| KeyError::KeyMismatch)
                .map(|key| KeyPair::EcdsaP384Sha384 { key, rng })
            }

            SecretKeyBytes::Ed25519(s) => {
                Ed25519KeyPair::from_seed_and_public_key(
                    s.as_ref(),
                    public.public_key().as_ref(),
                )
                .map_err(|_| KeyError::KeyMismatch)
                .map(KeyPair::Ed25519)
            }
        }
    }

    /// The algorithm used by this key pair.
    pub fn algorithm(&self) -> SecAlg {
        match self {
            KeyPair::RsaSha256 { .. } => SecAlg::RSASHA256,
            KeyPair::RsaSha512 { .. } => SecAlg::RSASHA512,
            KeyPair::EcdsaP256Sha256 { .. } => SecAlg::ECDSAP256SHA256,
            KeyPair::EcdsaP384Sha384 { .. } => SecAlg::ECDSAP384SHA384,
            KeyPair::Ed25519(_) => SecAlg::ED25519,
        }
    }

    /// The raw public key in KEY rdata form.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            KeyPair::RsaSha256 { key, .. }
            | KeyPair::RsaSha512 { key, .. } => {
                let components: ring::rsa::PublicKeyComponents<Vec<u8>> =
                    key.public().into();
                // RFC 3110: one-octet exponent length (the short form
                // suffices for real-world exponents), exponent, modulus.
                let mut res = Vec::new();
                res.push(u8::try_from(components.e.len()).expect("huge e"));
                res.extend_from_slice(&components.e);
                res.extend_from_slice(&components.n);
                res
            }
            KeyPair::EcdsaP256Sha256 { key, .. }
            | KeyPair::EcdsaP384Sha384 { key, .. } => {
                // Strip the uncompressed-point marker ring prepends.
                key.public_key().as_ref()[1..].to_vec()
            }
            KeyPair::Ed25519(key) => key.public_key().as_ref().to_vec(),
        }
    }

    /// Signs `data` with this key pair.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignError> {
        match self {
            KeyPair::RsaSha256 { key, rng } => {
                let mut buf = vec![0u8; key.public().modulus_len()];
                key.sign(&ring::signature::RSA_PKCS1_SHA256, rng, data, &mut buf)
                    .map(|()| buf)
                    .map_err(|_| SignError)
            }
            KeyPair::RsaSha512 { key, rng } => {
                let mut buf = vec![0u8; key.public().modulus_len()];
                key.sign(&ring::signature::RSA_PKCS1_SHA512, rng, data, &mut buf)
                    .map(|()| buf)
                    .map_err(|_| SignError)
            }
            KeyPair::EcdsaP256Sha256 { key, rng }
            | KeyPair::EcdsaP384Sha384 { key, rng } => key
                .sign(rng, data)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| SignError),
            KeyPair::Ed25519(key) => Ok(key.sign(data).as_ref().to_vec()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("KeyPair").field(&self.algorithm()).finish()
    }
}

/// Returns the RSA exponent and modulus components from KEY record data.
///
/// See [RFC 3110, section 2] for the encoding.
///
/// [RFC 3110, section 2]: https://tools.ietf.org/html/rfc3110#section-2
pub(crate) fn rsa_exponent_modulus(
    key: &Key<impl AsRef<[u8]>>,
) -> Result<(&[u8], &[u8]), KeyError> {
    let public_key = key.public_key().as_ref();
    if public_key.len() <= 3 {
        return Err(KeyError::BadKeyRecord);
    }

    let (pos, exp_len) = match public_key[0] {
        0 => (
            3,
            (usize::from(public_key[1]) << 8) | usize::from(public_key[2]),
        ),
        len => (1, usize::from(len)),
    };

    if public_key.len() < pos + exp_len {
        return Err(KeyError::BadKeyRecord);
    };

    Ok(public_key[pos..].split_at(exp_len))
}

/// Returns the public key as the uncompressed curve point ring expects.
pub(crate) fn ecdsa_public_point(key: &Key<impl AsRef<[u8]>>) -> Vec<u8> {
    let public_key = key.public_key().as_ref();
    let mut res = Vec::with_capacity(public_key.len() + 1);
    res.push(0x4);
    res.extend_from_slice(public_key);
    res
}

//------------ SecretKeyBytes ------------------------------------------------

/// A secret key expressed as raw bytes.
///
/// This type interacts with private keys stored in the format popularized
/// by BIND: a line-oriented text file of `key: value` entries, starting
/// with a `Private-key-format` version entry and an `Algorithm` entry,
/// followed by base64-encoded key material whose layout depends on the
/// algorithm.
pub enum SecretKeyBytes {
    /// An RSA/SHA-256 key.
    RsaSha256(RsaSecretKeyBytes),

    /// An RSA/SHA-512 key.
    RsaSha512(RsaSecretKeyBytes),

    /// An ECDSA P-256/SHA-256 key: a single 32-byte big-endian scalar.
    EcdsaP256Sha256(Box<[u8; 32]>),

    /// An ECDSA P-384/SHA-384 key: a single 48-byte big-endian scalar.
    EcdsaP384Sha384(Box<[u8; 48]>),

    /// An Ed25519 key: the 32-byte seed.
    Ed25519(Box<[u8; 32]>),
}

impl SecretKeyBytes {
    /// The algorithm used by this key.
    pub fn algorithm(&self) -> SecAlg {
        match self {
            Self::RsaSha256(_) => SecAlg::RSASHA256,
            Self::RsaSha512(_) => SecAlg::RSASHA512,
            Self::EcdsaP256Sha256(_) => SecAlg::ECDSAP256SHA256,
            Self::EcdsaP384Sha384(_) => SecAlg::ECDSAP384SHA384,
            Self::Ed25519(_) => SecAlg::ED25519,
        }
    }

    /// Parses a secret key from the conventional format used by BIND.
    ///
    /// Any v1.x format with x of at least 2 is accepted; entries that are
    /// not needed for the algorithm at hand are ignored.
    pub fn parse_from_bind(data: &str) -> Result<Self, KeyError> {
        fn parse_pkey<const N: usize>(
            mut data: &str,
        ) -> Result<Box<[u8; N]>, KeyError> {
            while let Some((key, val, rest)) = next_bind_entry(data)? {
                data = rest;
                if key != "PrivateKey" {
                    continue;
                }
                return base64::decode::<Vec<u8>>(val)
                    .map_err(|_| KeyError::BadPrivateKey)?
                    .into_boxed_slice()
                    .try_into()
                    .map_err(|_| KeyError::BadPrivateKey);
            }
            Err(KeyError::BadPrivateKey)
        }

        // The first entry must name a format version we understand.
        let (_, _, data) = next_bind_entry(data)?
            .filter(|&(key, val, _)| {
                key == "Private-key-format"
                    && val
                        .strip_prefix("v1.")
                        .and_then(|minor| minor.parse::<u8>().ok())
                        .map_or(false, |minor| minor >= 2)
            })
            .ok_or(KeyError::BadPrivateKey)?;

        // The second entry specifies the algorithm, e.g. "15 (ED25519)".
        let (_, val, data) = next_bind_entry(data)?
            .filter(|&(key, _, _)| key == "Algorithm")
            .ok_or(KeyError::BadPrivateKey)?;
        let code = val
            .split_whitespace()
            .next()
            .and_then(|code| code.parse::<u8>().ok())
            .ok_or(KeyError::BadPrivateKey)?;

        match SecAlg::from_int(code) {
            SecAlg::RSASHA256 => {
                RsaSecretKeyBytes::parse_from_bind(data).map(Self::RsaSha256)
            }
            SecAlg::RSASHA512 => {
                RsaSecretKeyBytes::parse_from_bind(data).map(Self::RsaSha512)
            }
            SecAlg::ECDSAP256SHA256 => {
                parse_pkey(data).map(Self::EcdsaP256Sha256)
            }
            SecAlg::ECDSAP384SHA384 => {
                parse_pkey(data).map(Self::EcdsaP384Sha384)
            }
            SecAlg::ED25519 => parse_pkey(data).map(Self::Ed25519),
            other => Err(KeyError::UnsupportedAlgorithm(other)),
        }
    }
}

impl Drop for SecretKeyBytes {
    fn drop(&mut self) {
        // Zero the secret bytes.
        match self {
            Self::RsaSha256(_) | Self::RsaSha512(_) => {}
            Self::EcdsaP256Sha256(s) => s.fill(0),
            Self::EcdsaP384Sha384(s) => s.fill(0),
            Self::Ed25519(s) => s.fill(0),
        }
    }
}

//------------ RsaSecretKeyBytes ---------------------------------------------

/// An RSA secret key expressed as raw bytes.
///
/// All fields are big-endian integers.
pub struct RsaSecretKeyBytes {
    /// The public modulus.
    pub n: Box<[u8]>,

    /// The public exponent.
    pub e: Box<[u8]>,

    /// The private exponent.
    pub d: Box<[u8]>,

    /// The first prime factor.
    pub p: Box<[u8]>,

    /// The second prime factor.
    pub q: Box<[u8]>,

    /// The exponent for the first prime factor.
    pub d_p: Box<[u8]>,

    /// The exponent for the second prime factor.
    pub d_q: Box<[u8]>,

    /// The inverse of the second prime factor modulo the first.
    pub q_i: Box<[u8]>,
}

impl RsaSecretKeyBytes {
    /// Parses the RSA fields of a BIND private key file body.
    pub fn parse_from_bind(mut data: &str) -> Result<Self, KeyError> {
        let mut n = None;
        let mut e = None;
        let mut d = None;
        let mut p = None;
        let mut q = None;
        let mut d_p = None;
        let mut d_q = None;
        let mut q_i = None;

        while let Some((key, val, rest)) = next_bind_entry(data)? {
            let field = match key {
                "Modulus" => &mut n,
                "PublicExponent" => &mut e,
                "PrivateExponent" => &mut d,
                "Prime1" => &mut p,
                "Prime2" => &mut q,
                "Exponent1" => &mut d_p,
                "Exponent2" => &mut d_q,
                "Coefficient" => &mut q_i,
                _ => {
                    data = rest;
                    continue;
                }
            };
            *field = Some(
                base64::decode::<Vec<u8>>(val)
                    .map_err(|_| KeyError::BadPrivateKey)?
                    .into_boxed_slice(),
            );
            data = rest;
        }

        Ok(RsaSecretKeyBytes {
            n: n.ok_or(KeyError::BadPrivateKey)?,
            e: e.ok_or(KeyError::BadPrivateKey)?,
            d: d.ok_or(KeyError::BadPrivateKey)?,
            p: p.ok_or(KeyError::BadPrivateKey)?,
            q: q.ok_or(KeyError::BadPrivateKey)?,
            d_p: d_p.ok_or(KeyError::BadPrivateKey)?,
            d_q: d_q.ok_or(KeyError::BadPrivateKey)?,
            q_i: q_i.ok_or(KeyError::BadPrivateKey)?,
        })
    }
}

impl Drop for RsaSecretKeyBytes {
    fn drop(&mut self) {
        self.d.fill(0);
        self.p.fill(0);
        self.q.fill(0);
        self.d_p.fill(0);
        self.d_q.fill(0);
        self.q_i.fill(0);
    }
}

/// Returns the next `key: value` entry of a BIND-format file.
///
/// Blank lines and comment lines are skipped. Returns `None` when the
/// input is exhausted.
fn next_bind_entry(
    mut data: &str,
) -> Result<Option<(&str, &str, &str)>, KeyError> {
    loop {
        let (line, rest) = match data.split_once('\n') {
            Some((line, rest)) => (line, rest),
            None => (data, ""),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            if rest.is_empty() {
                return Ok(None);
            }
            data = rest;
            continue;
        }
        let (key, val) = trimmed
            .split_once(':')
            .ok_or(KeyError::BadPrivateKey)?;
        return Ok(Some((key.trim(), val.trim(), rest)));
    }
}

//------------ TrustedKeys ---------------------------------------------------

/// The public keys the server accepts update signatures from.
///
/// Maps signer names to their KEY records. Loaded before the server
/// starts; never modified while it runs.
#[derive(Clone, Debug, Default)]
pub struct TrustedKeys {
    keys: HashMap<Name<Bytes>, Key<Bytes>>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a key, returning any previous key of the same owner.
    pub fn insert(
        &mut self,
        name: Name<Bytes>,
        key: Key<Bytes>,
    ) -> Option<Key<Bytes>> {
        self.keys.insert(name, key)
    }

    /// Looks up the key for a signer name.
    pub fn get(&self, name: &Name<Bytes>) -> Option<&Key<Bytes>> {
        self.keys.get(name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&Name<Bytes>, &Key<Bytes>)> {
        self.keys.iter()
    }
}

/// Loads all `.key` files of a directory into a [`TrustedKeys`] map.
///
/// Files with other extensions are skipped. A file that has the right
/// extension but does not contain a KEY record is an error: better to
/// refuse to start than to silently serve with a partial trust set.
pub fn read_public_keys(
    dir: impl AsRef<Path>,
) -> Result<TrustedKeys, KeyError> {
    let dir = dir.as_ref();
    let mut keys = TrustedKeys::new();
    let entries = std::fs::read_dir(dir)
        .map_err(|err| KeyError::Io(dir.to_path_buf(), err))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| KeyError::Io(dir.to_path_buf(), err))?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "key") {
            debug!("skipping non-key file {}", path.display());
            continue;
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|err| KeyError::Io(path.clone(), err))?;
        let (name, key) = parse_key_file(&data)?;
        debug!(
            "loaded key {} (tag {}) from {}",
            name,
            key.key_tag(),
            path.display()
        );
        keys.insert(name, key);
    }
    Ok(keys)
}

/// Parses the first record of a `.key` file.
///
/// Comment lines as written by `dnssec-keygen` are skipped.
pub fn parse_key_file(
    data: &str,
) -> Result<(Name<Bytes>, Key<Bytes>), KeyError> {
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        return parse_key_record(line);
    }
    Err(KeyError::BadKeyRecord)
}

/// Parses a KEY record in zone-file syntax.
///
/// TTL and class are optional, as they are in zone files.
pub fn parse_key_record(
    line: &str,
) -> Result<(Name<Bytes>, Key<Bytes>), KeyError> {
    let mut tokens = line.split_whitespace();
    let owner = tokens.next().ok_or(KeyError::BadKeyRecord)?;
    let owner =
        Name::from_str(owner).map_err(|_| KeyError::BadKeyRecord)?;

    let mut token = tokens.next().ok_or(KeyError::BadKeyRecord)?;
    if token.chars().all(|c| c.is_ascii_digit()) {
        // A TTL; ignored.
        token = tokens.next().ok_or(KeyError::BadKeyRecord)?;
    }
    if token.eq_ignore_ascii_case("IN") {
        token = tokens.next().ok_or(KeyError::BadKeyRecord)?;
    }
    if !token.eq_ignore_ascii_case("KEY") {
        return Err(KeyError::BadKeyRecord);
    }

    let flags = tokens
        .next()
        .and_then(|t| u16::from_str(t).ok())
        .ok_or(KeyError::BadKeyRecord)?;
    let protocol = tokens
        .next()
        .and_then(|t| u8::from_str(t).ok())
        .ok_or(KeyError::BadKeyRecord)?;
    let algorithm = tokens
        .next()
        .and_then(|t| match u8::from_str(t) {
            Ok(code) => Some(SecAlg::from_int(code)),
            Err(_) => SecAlg::from_mnemonic(t.as_bytes()),
        })
        .ok_or(KeyError::BadKeyRecord)?;

    let b64: String = tokens.collect();
    if b64.is_empty() {
        return Err(KeyError::BadKeyRecord);
    }
    let public_key = base64::decode::<Bytes>(&b64)
        .map_err(|_| KeyError::BadKeyRecord)?;

    let key = Key::new(flags, protocol, algorithm, public_key)
        .map_err(|_| KeyError::BadKeyRecord)?;
    Ok((owner, key))
}

//============ Error Types ===================================================

//------------ KeyError ------------------------------------------------------

/// A key file could not be loaded.
///
/// Keys are loaded before the server starts serving; these errors belong
/// to the configuration class and are fatal at startup.
#[derive(Debug)]
pub enum KeyError {
    /// Reading a file failed.
    Io(PathBuf, io::Error),

    /// The file name does not end in `.key` or `.private`.
    FileName(PathBuf),

    /// The `.key` file does not hold a usable KEY record.
    BadKeyRecord,

    /// The `.private` file is not in a format we understand.
    BadPrivateKey,

    /// The algorithm is not one we support.
    UnsupportedAlgorithm(SecAlg),

    /// The public and private halves do not belong together.
    KeyMismatch,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyError::Io(path, err) => {
                write!(f, "{}: {}", path.display(), err)
            }
            KeyError::FileName(path) => {
                write!(
                    f,
                    "{}: expected a .key or .private file",
                    path.display()
                )
            }
            KeyError::BadKeyRecord => f.write_str("invalid KEY record"),
            KeyError::BadPrivateKey => {
                f.write_str("invalid private key file")
            }
            KeyError::UnsupportedAlgorithm(alg) => {
                write!(f, "unsupported algorithm {}", alg)
            }
            KeyError::KeyMismatch => {
                f.write_str("public and private key do not match")
            }
        }
    }
}

impl error::Error for KeyError {}

//------------ SignError -----------------------------------------------------

/// Producing a signature failed.
#[derive(Clone, Copy, Debug)]
pub struct SignError;

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signing failed")
    }
}

impl error::Error for SignError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;

    // 43 base64 'A's and padding: 32 zero bytes.
    const ZERO32_B64: &str =
        "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn ed25519_private_from_bind() {
        let text = format!(
            "Private-key-format: v1.3\n\
             Algorithm: 15 (ED25519)\n\
             PrivateKey: {}\n",
            ZERO32_B64
        );
        let key = SecretKeyBytes::parse_from_bind(&text).unwrap();
        assert_eq!(key.algorithm(), SecAlg::ED25519);
        match key {
            SecretKeyBytes::Ed25519(ref seed) => {
                assert_eq!(seed.as_ref(), &[0u8; 32]);
            }
            _ => panic!("parsed wrong algorithm"),
        }
    }

    #[test]
    fn rsa_private_from_bind() {
        let text = "Private-key-format: v1.2\n\
                    Algorithm: 8 (RSASHA256)\n\
                    Modulus: AQAB\n\
                    PublicExponent: AQAB\n\
                    PrivateExponent: AQAB\n\
                    Prime1: AQAB\n\
                    Prime2: AQAB\n\
                    Exponent1: AQAB\n\
                    Exponent2: AQAB\n\
                    Coefficient: AQAB\n";
        let key = SecretKeyBytes::parse_from_bind(text).unwrap();
        match key {
            SecretKeyBytes::RsaSha256(ref rsa) => {
                assert_eq!(rsa.e.as_ref(), &[1, 0, 1]);
                assert_eq!(rsa.n.as_ref(), &[1, 0, 1]);
            }
            _ => panic!("parsed wrong algorithm"),
        }
    }

    #[test]
    fn unsupported_private_algorithm() {
        let text = "Private-key-format: v1.3\n\
                    Algorithm: 16 (ED448)\n\
                    PrivateKey: AQAB\n";
        assert!(matches!(
            SecretKeyBytes::parse_from_bind(text),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn bad_format_version() {
        let text = "Private-key-format: v2.0\n\
                    Algorithm: 15 (ED25519)\n\
                    PrivateKey: AQAB\n";
        assert!(SecretKeyBytes::parse_from_bind(text).is_err());
    }

    #[test]
    fn key_record_line() {
        let line = format!("child.example. 3600 IN KEY 512 3 15 {}", ZERO32_B64);
        let (name, key) = parse_key_record(&line).unwrap();
        assert_eq!(name, Name::from_str("child.example.").unwrap());
        assert_eq!(key.flags(), 512);
        assert_eq!(key.protocol(), 3);
        assert_eq!(key.algorithm(), SecAlg::ED25519);
        assert_eq!(key.public_key().as_ref(), &[0u8; 32]);

        // TTL and class are optional.
        let short = format!("child.example. KEY 512 3 ED25519 {}", ZERO32_B64);
        let (_, key) = parse_key_record(&short).unwrap();
        assert_eq!(key.algorithm(), SecAlg::ED25519);

        assert!(parse_key_record("child.example. 3600 IN A 192.0.2.1")
            .is_err());
    }

    #[test]
    fn key_file_skips_comments() {
        let text = format!(
            "; This is a key-signing key, keyid 4711, for child.example.\n\
             child.example. IN KEY 512 3 15 {}\n",
            ZERO32_B64
        );
        let (name, _) = parse_key_file(&text).unwrap();
        assert_eq!(name, Name::from_str("child.example.").unwrap());
    }

    #[test]
    fn rsa_exponent_modulus_split() {
        let mut rdata = vec![3u8, 1, 0, 1];
        rdata.extend_from_slice(&[0xab; 16]);
        let key =
            Key::new(256, 3, SecAlg::RSASHA256, rdata.clone()).unwrap();
        let (e, n) = rsa_exponent_modulus(&key).unwrap();
        assert_eq!(e, &[1, 0, 1]);
        assert_eq!(n, &[0xab; 16]);
    }
}
