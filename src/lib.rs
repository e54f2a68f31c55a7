//! Discovery and authenticated synchronization of DNS delegation data.
//!
//! When a child zone changes its name servers, somebody has to tell the
//! parent. This crate implements the machinery for doing that inside
//! the DNS itself: the parent advertises where it wants to hear about
//! changes, the child finds the advertisement, works out the minimal
//! change set, and delivers it as a signed dynamic update; a server on
//! the parent side authenticates updates, checks them against policy,
//! and applies them in the background.
//!
//! The pieces, bottom up:
//!
//! * [`rdata`] defines the private NOTIFY advertisement record and the
//!   KEY/SIG record pair for transaction signatures;
//! * [`diff`] computes what has to change between two RRsets;
//! * [`keys`] loads signing and verification key material;
//! * [`sig0`] signs and verifies whole messages;
//! * [`discovery`] finds the parent zone and its delivery target;
//! * [`update`] builds, sends, and interprets update messages;
//! * [`policy`] decides what an authenticated signer may change;
//! * [`server`] dispatches inbound messages;
//! * [`engine`] applies the resulting work asynchronously;
//! * [`config`] is the one flat object configuring all of it.
//!
//! Message parsing, name types, and the actual transports come from the
//! [`domain`] crate; this crate adds the synchronization semantics on
//! top.

pub mod config;
pub mod diff;
pub mod discovery;
pub mod engine;
pub mod keys;
pub mod policy;
pub mod rdata;
pub mod server;
pub mod sig0;
pub mod update;

use bytes::Bytes;
use domain::base::name::Name;
use domain::base::record::Record;
use domain::rdata::AllRecordData;

/// A domain name held in memory.
pub type StoredName = Name<Bytes>;

/// Record data held in memory.
pub type StoredData = AllRecordData<Bytes, StoredName>;

/// A record held in memory.
pub type StoredRecord = Record<StoredName, StoredData>;
