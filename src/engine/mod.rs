//! The background engines behind the dispatcher.
//!
//! The dispatcher (see [`crate::server`]) answers quickly and pushes the
//! actual work onto bounded queues. Two engines drain them: the scan
//! engine re-examines zones that announced changes, the update engine
//! applies authorized update batches, one at a time.

pub mod scan;
pub mod update;

pub use self::scan::ScanEngine;
pub use self::update::{MemoryStore, StoreError, UpdateEngine, UpdateStore};

use crate::update::UpdateAction;
use crate::StoredName;
use domain::base::iana::Rtype;
use std::vec::Vec;

//------------ ScanRequest ---------------------------------------------------

/// A request to re-examine one RRset of a zone.
#[derive(Clone, Debug)]
pub struct ScanRequest {
    /// The zone that announced a change.
    pub zone: StoredName,

    /// The record type to look at.
    pub rtype: Rtype,
}

//------------ UpdateRequest -------------------------------------------------

/// An authenticated, authorized update batch awaiting application.
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    /// The zone the update applies to.
    pub zone: StoredName,

    /// The verified signer the batch came from.
    pub signer: StoredName,

    /// The actions to apply.
    pub actions: Vec<UpdateAction>,
}
