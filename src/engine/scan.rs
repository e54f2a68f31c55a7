//! The scan engine.
//!
//! A NOTIFY tells us *that* something changed in a zone, not *what*.
//! The scan engine finds out: it queries the child's server for the
//! announced RRset and compares it against what was seen before. Next to
//! the queue-driven scans it re-examines everything it has seen on a
//! fixed interval, in case a NOTIFY got lost.

use super::ScanRequest;
use crate::config::Config;
use crate::diff::{diff, RrsetDiff};
use crate::discovery::auth_query;
use crate::{StoredName, StoredRecord};
use domain::base::iana::Rtype;
use std::collections::HashMap;
use std::sync::Arc;
use std::vec::Vec;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

//------------ ScanEngine ----------------------------------------------------

/// The consumer of the scan queue.
pub struct ScanEngine {
    config: Arc<Config>,
    queue: mpsc::Receiver<ScanRequest>,

    /// What each scanned RRset looked like last time.
    seen: HashMap<(StoredName, Rtype), Vec<StoredRecord>>,
}

impl ScanEngine {
    pub fn new(
        config: Arc<Config>,
        queue: mpsc::Receiver<ScanRequest>,
    ) -> Self {
        ScanEngine {
            config,
            queue,
            seen: HashMap::new(),
        }
    }

    /// Runs until the queue is closed.
    pub async fn run(mut self) {
        info!("scan engine starting");
        let mut interval =
            tokio::time::interval(self.config.scan_interval());
        interval
            .set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scan_all().await;
                }
                request = self.queue.recv() => {
                    match request {
                        Some(request) => self.scan(request).await,
                        None => break,
                    }
                }
            }
        }
        info!("scan engine terminating");
    }

    /// Periodic pass over everything scanned before.
    async fn scan_all(&mut self) {
        let known: Vec<_> = self.seen.keys().cloned().collect();
        if known.is_empty() {
            return;
        }
        debug!("periodic scan of {} known rrsets", known.len());
        for (zone, rtype) in known {
            self.scan(ScanRequest { zone, rtype }).await;
        }
    }

    async fn scan(&mut self, request: ScanRequest) {
        let Some(server) = self.config.child_server else {
            debug!(
                "no child server configured; ignoring scan of {} {}",
                request.zone, request.rtype
            );
            return;
        };
        info!("scanning {} {}", request.zone, request.rtype);
        match auth_query(
            &request.zone,
            server,
            request.rtype,
            self.config.query_timeout(),
        )
        .await
        {
            Ok(records) => {
                let outcome =
                    self.observe(&request.zone, request.rtype, records);
                if outcome.differs() {
                    info!(
                        "{} {} changed: {} to add, {} to remove",
                        request.zone,
                        request.rtype,
                        outcome.adds.len(),
                        outcome.removes.len()
                    );
                } else {
                    debug!(
                        "{} {} is unchanged",
                        request.zone, request.rtype
                    );
                }
            }
            Err(err) => {
                warn!(
                    "scanning {} {} failed: {}",
                    request.zone, request.rtype, err
                );
            }
        }
    }

    /// Records the latest state of an RRset, returning what changed.
    fn observe(
        &mut self,
        zone: &StoredName,
        rtype: Rtype,
        records: Vec<StoredRecord>,
    ) -> RrsetDiff<StoredName, crate::StoredData> {
        let key = (zone.clone(), rtype);
        let previous = self.seen.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let outcome = diff(previous, &records);
        self.seen.insert(key, records);
        outcome
    }
}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::{Record, Ttl};
    use domain::rdata::Ns;
    use std::str::FromStr;

    fn engine() -> ScanEngine {
        let config: Config = serde_yaml::from_str(
            "policy:\n\
             \x20 scope: self\n\
             \x20 allowed_rtypes: [NS]\n",
        )
        .unwrap();
        let (_tx, rx) = mpsc::channel(1);
        ScanEngine::new(Arc::new(config), rx)
    }

    fn ns(target: &str) -> StoredRecord {
        Record::new(
            StoredName::from_str("child.example.").unwrap(),
            Class::IN,
            Ttl::from_secs(300),
            Ns::new(StoredName::from_str(target).unwrap()).into(),
        )
    }

    #[test]
    fn observe_tracks_changes() {
        let mut engine = engine();
        let zone = StoredName::from_str("child.example.").unwrap();

        // First sighting: everything is new.
        let outcome =
            engine.observe(&zone, Rtype::NS, vec![ns("ns1.example.")]);
        assert_eq!(outcome.adds.len(), 1);
        assert!(outcome.removes.is_empty());

        // Same records again: no change.
        let outcome =
            engine.observe(&zone, Rtype::NS, vec![ns("ns1.example.")]);
        assert!(!outcome.differs());

        // A server swap shows up as one add and one remove.
        let outcome =
            engine.observe(&zone, Rtype::NS, vec![ns("ns2.example.")]);
        assert_eq!(outcome.adds.len(), 1);
        assert_eq!(outcome.removes.len(), 1);
    }
}
