//! The server: classify, authenticate, authorize, hand off.
//!
//! Every configured listen address serves UDP and TCP with the same
//! stateless service. The service sorts inbound messages by opcode: a
//! NOTIFY is acknowledged and turned into scan requests, an UPDATE runs
//! through signature verification and the update policy before its
//! actions are queued for the update engine, everything else is
//! answered with NOTIMP. Nothing here blocks on the network: queue
//! submission never awaits and the engines do the slow work elsewhere.
//!
//! A failed verification or an unauthorized update is an answer and a
//! log line, never more. One bad message must not cost anyone else
//! their service.

use crate::config::{Config, OverflowPolicy};
use crate::engine::{
    ScanEngine, ScanRequest, UpdateEngine, UpdateRequest, UpdateStore,
};
use crate::keys::TrustedKeys;
use crate::policy::UpdatePolicy;
use crate::sig0::{verify_message, VerifyError};
use crate::update::parse_update_section;
use core::fmt;
use domain::base::iana::{Opcode, Rcode};
use domain::base::message::Message;
use domain::base::name::ToName;
use domain::net::server::buf::VecBufSource;
use domain::net::server::dgram::DgramServer;
use domain::net::server::message::Request;
use domain::net::server::middleware::edns::EdnsMiddlewareSvc;
use domain::net::server::middleware::mandatory::MandatoryMiddlewareSvc;
use domain::net::server::service::{CallResult, ServiceError, ServiceResult};
use domain::net::server::stream::StreamServer;
use domain::net::server::util::{mk_builder_for_target, service_fn};
use std::sync::Arc;
use std::vec::Vec;
use std::{error, io};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

//------------ Server --------------------------------------------------------

/// A running server instance.
pub struct Server {
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Validates the configuration, spawns the engines and listeners.
    ///
    /// The store ends up shared behind a mutex; keep a clone of the
    /// `Arc` to look at what updates have been applied.
    pub async fn spawn<Store>(
        config: Arc<Config>,
        trusted: TrustedKeys,
        store: Arc<Mutex<Store>>,
    ) -> Result<Self, ServerError>
    where
        Store: UpdateStore + Send + 'static,
    {
        let policy = config.policy()?;
        let (scan_tx, scan_rx) = mpsc::channel(config.queue_len);
        let (update_tx, update_rx) = mpsc::channel(config.queue_len);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(
            ScanEngine::new(config.clone(), scan_rx).run(),
        ));
        tasks.push(tokio::spawn(UpdateEngine::new(store, update_rx).run()));

        let state = Arc::new(ServerState {
            config: config.clone(),
            policy,
            trusted,
            scan_tx,
            update_tx,
        });
        let svc = service_fn(dispatch, state);
        let svc = EdnsMiddlewareSvc::<Vec<u8>, _, _>::new(svc);
        let svc = MandatoryMiddlewareSvc::<Vec<u8>, _, _>::new(svc);
        let svc = Arc::new(svc);

        for &addr in &config.listen {
            let sock = UdpSocket::bind(addr)
                .await
                .map_err(ServerError::Bind)?;
            let udp_srv = DgramServer::new(
                Arc::new(sock),
                VecBufSource,
                svc.clone(),
            );
            tasks.push(tokio::spawn(async move { udp_srv.run().await }));

            let listener = TcpListener::bind(addr)
                .await
                .map_err(ServerError::Bind)?;
            let tcp_srv =
                StreamServer::new(listener, VecBufSource, svc.clone());
            tasks.push(tokio::spawn(async move { tcp_srv.run().await }));

            info!("listening on {} over udp and tcp", addr);
        }

        Ok(Server { tasks })
    }

    /// Waits for the server's tasks. Does not normally return.
    pub async fn run(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Stops all tasks.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

//------------ ServerState ---------------------------------------------------

/// Everything the dispatcher needs; shared, immutable, lock-free.
struct ServerState {
    config: Arc<Config>,
    policy: UpdatePolicy,
    trusted: TrustedKeys,
    scan_tx: mpsc::Sender<ScanRequest>,
    update_tx: mpsc::Sender<UpdateRequest>,
}

//------------ dispatch ------------------------------------------------------

/// The service behind all listeners.
fn dispatch(
    request: Request<Vec<u8>>,
    state: Arc<ServerState>,
) -> ServiceResult<Vec<u8>> {
    let message: &Message<Vec<u8>> = request.message();
    match message.header().opcode() {
        Opcode::NOTIFY => handle_notify(&request, message, &state),
        Opcode::UPDATE => handle_update(&request, message, &state),
        opcode => {
            debug!(
                "ignoring {} message from {}",
                opcode,
                request.client_addr()
            );
            respond(message, Rcode::NOTIMP)
        }
    }
}

/// NOTIFY: acknowledge, then queue a scan per question.
fn handle_notify(
    request: &Request<Vec<u8>>,
    message: &Message<Vec<u8>>,
    state: &ServerState,
) -> ServiceResult<Vec<u8>> {
    for question in message.question().flatten() {
        let scan = ScanRequest {
            zone: question.qname().to_bytes(),
            rtype: question.qtype(),
        };
        info!(
            "received NOTIFY({}) for zone {} from {}",
            scan.rtype,
            scan.zone,
            request.client_addr()
        );
        if let Some(overflow) =
            submit(&state.scan_tx, scan, state, message)
        {
            return overflow;
        }
    }
    respond(message, Rcode::NOERROR)
}

/// UPDATE: verify, authorize, queue.
fn handle_update(
    request: &Request<Vec<u8>>,
    message: &Message<Vec<u8>>,
    state: &ServerState,
) -> ServiceResult<Vec<u8>> {
    let signer = match verify_message(message, &state.trusted) {
        Ok(signer) => signer,
        Err(err) => {
            warn!(
                "rejecting update from {}: {}",
                request.client_addr(),
                err
            );
            return respond(message, verify_rcode(err));
        }
    };

    let zone = match message.sole_question() {
        Ok(question) => question.qname().to_bytes(),
        Err(_) => return respond(message, Rcode::FORMERR),
    };
    let actions = match parse_update_section(message) {
        Ok(actions) => actions,
        Err(_) => return respond(message, Rcode::FORMERR),
    };

    if let Err(rejection) = state.policy.evaluate(&actions, &signer) {
        // The transaction is still acknowledged; the refusal shows up
        // in the log, not in the rcode.
        warn!("dropping update signed by {}: {}", signer, rejection);
        return respond(message, Rcode::NOERROR);
    }

    info!(
        "queueing {} actions for zone {} signed by {}",
        actions.len(),
        zone,
        signer
    );
    let update = UpdateRequest {
        zone,
        signer,
        actions,
    };
    if let Some(overflow) =
        submit(&state.update_tx, update, state, message)
    {
        return overflow;
    }
    respond(message, Rcode::NOERROR)
}

/// Maps a verification failure onto the rcode the sender gets back.
fn verify_rcode(err: VerifyError) -> Rcode {
    match err {
        VerifyError::Unsigned | VerifyError::Malformed => Rcode::FORMERR,
        VerifyError::UnknownKey
        | VerifyError::BadAlgorithm
        | VerifyError::BadSignature
        | VerifyError::BadTime => Rcode::NOTAUTH,
    }
}

/// Hands work to an engine queue without ever blocking.
///
/// Returns the response to send instead if the work could not be
/// queued and the configured policy wants the sender to know.
fn submit<T>(
    queue: &mpsc::Sender<T>,
    item: T,
    state: &ServerState,
    message: &Message<Vec<u8>>,
) -> Option<ServiceResult<Vec<u8>>> {
    match queue.try_send(item) {
        Ok(()) => None,
        Err(mpsc::error::TrySendError::Full(_)) => {
            match state.config.overflow {
                OverflowPolicy::Drop => {
                    error!("queue full, dropping work");
                    None
                }
                OverflowPolicy::Reject => {
                    Some(respond(message, Rcode::SERVFAIL))
                }
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            error!("engine queue closed, dropping work");
            Some(respond(message, Rcode::SERVFAIL))
        }
    }
}

/// Builds a minimal response with the given rcode.
fn respond(
    message: &Message<Vec<u8>>,
    rcode: Rcode,
) -> ServiceResult<Vec<u8>> {
    let builder = mk_builder_for_target();
    let additional = builder
        .start_answer(message, rcode)
        .map_err(|_| ServiceError::InternalError)?
        .additional();
    Ok(CallResult::new(additional))
}

//============ Error Types ===================================================

/// The server could not be brought up.
#[derive(Debug)]
pub enum ServerError {
    /// The configuration failed validation.
    Config(crate::config::ConfigError),

    /// Binding a listen address failed.
    Bind(io::Error),
}

impl From<crate::config::ConfigError> for ServerError {
    fn from(err: crate::config::ConfigError) -> Self {
        ServerError::Config(err)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerError::Config(err) => err.fmt(f),
            ServerError::Bind(err) => {
                write!(f, "binding listener failed: {}", err)
            }
        }
    }
}

impl error::Error for ServerError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rcode_mapping() {
        assert_eq!(verify_rcode(VerifyError::Unsigned), Rcode::FORMERR);
        assert_eq!(verify_rcode(VerifyError::Malformed), Rcode::FORMERR);
        assert_eq!(verify_rcode(VerifyError::UnknownKey), Rcode::NOTAUTH);
        assert_eq!(
            verify_rcode(VerifyError::BadSignature),
            Rcode::NOTAUTH
        );
        assert_eq!(verify_rcode(VerifyError::BadTime), Rcode::NOTAUTH);
    }
}
