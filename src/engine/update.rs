//! The update engine.
//!
//! Approved update batches end up here. The engine is the only writer:
//! it applies one batch at a time under a lock around the store, so a
//! crash or a slow store can delay updates but never interleave them.

use super::UpdateRequest;
use crate::rdata::Key;
use crate::update::UpdateAction;
use crate::{StoredName, StoredRecord};
use core::fmt;
use domain::base::iana::Rtype;
use domain::rdata::AllRecordData;
use octseq::parse::Parser;
use std::collections::HashMap;
use std::error;
use std::string::String;
use std::sync::Arc;
use std::vec::Vec;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

//------------ UpdateStore ---------------------------------------------------

/// Where approved updates land.
///
/// The engine hands over whole batches; what a store makes of them is
/// its own business. The provided [`MemoryStore`] keeps them in memory;
/// a persistent implementation would talk to its database here.
pub trait UpdateStore {
    /// Applies one batch. The actions arrive with removals first.
    fn apply_update(
        &mut self,
        request: &UpdateRequest,
    ) -> Result<(), StoreError>;
}

//------------ UpdateEngine --------------------------------------------------

/// The consumer of the update queue.
///
/// The store is shared so that whoever set the server up can keep a
/// handle on it; the mutex makes the engine's batches the only writes.
pub struct UpdateEngine<Store> {
    store: Arc<Mutex<Store>>,
    queue: mpsc::Receiver<UpdateRequest>,
}

impl<Store: UpdateStore> UpdateEngine<Store> {
    pub fn new(
        store: Arc<Mutex<Store>>,
        queue: mpsc::Receiver<UpdateRequest>,
    ) -> Self {
        UpdateEngine { store, queue }
    }

    /// Runs until the queue is closed.
    pub async fn run(mut self) {
        info!("update engine starting");
        while let Some(mut request) = self.queue.recv().await {
            info!(
                "applying {} actions for zone {} from {}",
                request.actions.len(),
                request.zone,
                request.signer
            );
            sort_removes_first(&mut request.actions);
            for action in &request.actions {
                log_key_action(action);
            }
            // One batch at a time; the store never sees two writers.
            let mut store = self.store.lock().await;
            if let Err(err) = store.apply_update(&request) {
                error!(
                    "applying update for zone {} failed: {}",
                    request.zone, err
                );
            }
        }
        info!("update engine terminating");
    }
}

/// Reorders a batch so that all removals come before all additions.
///
/// The relative order within each group is preserved.
pub fn sort_removes_first(actions: &mut [UpdateAction]) {
    actions.sort_by_key(|action| !action.is_remove());
}

/// Key changes are worth a log line of their own.
fn log_key_action(action: &UpdateAction) {
    if action.rtype() != Rtype::KEY {
        return;
    }
    let record = match action {
        UpdateAction::Add(record) | UpdateAction::Delete(record) => record,
        UpdateAction::DeleteRrset(owner, _) => {
            info!("update removes all keys at {}", owner);
            return;
        }
    };
    if let AllRecordData::Unknown(data) = record.data() {
        let mut parser = Parser::from_ref(data.data().as_ref());
        if let Ok(key) = Key::parse(&mut parser) {
            match action {
                UpdateAction::Add(_) => info!(
                    "update adds key with tag {} at {}",
                    key.key_tag(),
                    record.owner()
                ),
                _ => info!(
                    "update removes key with tag {} at {}",
                    key.key_tag(),
                    record.owner()
                ),
            }
        }
    }
}

//------------ MemoryStore ---------------------------------------------------

/// An in-memory update store.
///
/// Keeps the records resulting from applied updates, grouped by owner
/// and type. Mirrors what the receiver's key store does with KEY
/// records, but it is not picky about types.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    rrsets: HashMap<(StoredName, Rtype), Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// The stored records of one RRset.
    pub fn get(
        &self,
        owner: &StoredName,
        rtype: Rtype,
    ) -> Option<&[StoredRecord]> {
        self.rrsets
            .get(&(owner.clone(), rtype))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

impl UpdateStore for MemoryStore {
    fn apply_update(
        &mut self,
        request: &UpdateRequest,
    ) -> Result<(), StoreError> {
        for action in &request.actions {
            match action {
                UpdateAction::Add(record) => {
                    let rrset = self
                        .rrsets
                        .entry((record.owner().clone(), record.rtype()))
                        .or_default();
                    if !rrset.iter().any(|r| r.data() == record.data()) {
                        rrset.push(record.clone());
                    }
                }
                UpdateAction::Delete(record) => {
                    let key = (record.owner().clone(), record.rtype());
                    if let Some(rrset) = self.rrsets.get_mut(&key) {
                        rrset.retain(|r| r.data() != record.data());
                        if rrset.is_empty() {
                            self.rrsets.remove(&key);
                        }
                    } else {
                        debug!(
                            "removal of nonexistent record at {}; \
                             skipping",
                            record.owner()
                        );
                    }
                }
                UpdateAction::DeleteRrset(owner, rtype) => {
                    self.rrsets.remove(&(owner.clone(), *rtype));
                }
            }
        }
        Ok(())
    }
}

//============ Error Types ===================================================

/// A store failed to apply a batch.
#[derive(Debug)]
pub struct StoreError(String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        StoreError(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl error::Error for StoreError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::{Record, Ttl};
    use domain::rdata::Ns;
    use std::str::FromStr;

    fn name(name: &str) -> StoredName {
        StoredName::from_str(name).unwrap()
    }

    fn ns(owner: &str, target: &str) -> StoredRecord {
        Record::new(
            name(owner),
            Class::IN,
            Ttl::from_secs(300),
            Ns::new(name(target)).into(),
        )
    }

    fn request(actions: Vec<UpdateAction>) -> UpdateRequest {
        UpdateRequest {
            zone: name("example."),
            signer: name("child.example."),
            actions,
        }
    }

    #[test]
    fn removes_sort_before_adds() {
        let mut actions = vec![
            UpdateAction::Add(ns("child.example.", "ns1.example.")),
            UpdateAction::DeleteRrset(name("child.example."), Rtype::A),
            UpdateAction::Add(ns("child.example.", "ns2.example.")),
            UpdateAction::Delete(ns("child.example.", "ns3.example.")),
        ];
        sort_removes_first(&mut actions);
        assert!(actions[0].is_remove());
        assert!(actions[1].is_remove());
        // Stable: the adds keep their relative order.
        assert_eq!(
            actions[2],
            UpdateAction::Add(ns("child.example.", "ns1.example."))
        );
        assert_eq!(
            actions[3],
            UpdateAction::Add(ns("child.example.", "ns2.example."))
        );
    }

    #[test]
    fn memory_store_applies_batches() {
        let mut store = MemoryStore::new();
        store
            .apply_update(&request(vec![
                UpdateAction::Add(ns("child.example.", "ns1.example.")),
                UpdateAction::Add(ns("child.example.", "ns2.example.")),
            ]))
            .unwrap();
        let owner = name("child.example.");
        assert_eq!(store.get(&owner, Rtype::NS).unwrap().len(), 2);

        // Duplicate adds collapse.
        store
            .apply_update(&request(vec![UpdateAction::Add(ns(
                "child.example.",
                "ns1.example.",
            ))]))
            .unwrap();
        assert_eq!(store.get(&owner, Rtype::NS).unwrap().len(), 2);

        // Deleting one record leaves the rest.
        store
            .apply_update(&request(vec![UpdateAction::Delete(ns(
                "child.example.",
                "ns1.example.",
            ))]))
            .unwrap();
        assert_eq!(store.get(&owner, Rtype::NS).unwrap().len(), 1);

        // Deleting the whole rrset empties it.
        store
            .apply_update(&request(vec![UpdateAction::DeleteRrset(
                owner.clone(),
                Rtype::NS,
            )]))
            .unwrap();
        assert!(store.get(&owner, Rtype::NS).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn engine_drains_queue() {
        let (tx, rx) = mpsc::channel(4);
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let engine = UpdateEngine::new(store.clone(), rx);
        let handle = tokio::spawn(engine.run());

        tx.send(request(vec![
            UpdateAction::Add(ns("child.example.", "ns1.example.")),
            UpdateAction::Add(ns("child.example.", "ns2.example.")),
        ]))
        .await
        .unwrap();
        tx.send(request(vec![UpdateAction::Delete(ns(
            "child.example.",
            "ns2.example.",
        ))]))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let store = store.lock().await;
        let records =
            store.get(&name("child.example."), Rtype::NS).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], ns("child.example.", "ns1.example."));
    }
}
