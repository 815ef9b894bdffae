//! Serve loop: one peer link, one request at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::protocol::{PeerRequest, PeerResponse, SessionId};
use crate::bridge::transport::PeerTransport;
use crate::error::TransportError;
use crate::gatt::Characteristic;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Period of the idle tick between requests.
    pub idle_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(2000),
        }
    }
}

/// Counters for one `serve` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub requests: u64,
    pub reads: u64,
    pub writes: u64,
    pub refused: u64,
}

enum LoopEvent {
    Shutdown,
    Request(Option<PeerRequest>),
    LinkFailed(TransportError),
    Idle,
}

/// Serve `characteristic` over `transport` until the peer closes the link or
/// `shutdown` fires.
///
/// Requests are handled strictly in arrival order. Link errors end the run.
pub async fn serve<T: PeerTransport>(
    config: ServerConfig,
    characteristic: Arc<Characteristic>,
    mut transport: T,
    shutdown: CancellationToken,
) -> anyhow::Result<ServeSummary> {
    let mut session: Option<SessionId> = None;
    let mut summary = ServeSummary::default();

    // interval() panics on a zero period
    let mut idle = tokio::time::interval(config.idle_interval.max(Duration::from_millis(1)));
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);
    idle.tick().await;

    info!(
        device = %characteristic.profile().device_name,
        service = %characteristic.profile().service_uuid,
        "Serving peer link"
    );

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => LoopEvent::Shutdown,
            request = transport.recv() => match request {
                Ok(request) => LoopEvent::Request(request),
                Err(e) => LoopEvent::LinkFailed(e),
            },
            _ = idle.tick() => LoopEvent::Idle,
        };

        match event {
            LoopEvent::Shutdown => {
                info!("Shutdown requested");
                break;
            }
            LoopEvent::LinkFailed(e) => {
                error!(error = %e, "Peer link failed");
                return Err(e.into());
            }
            LoopEvent::Request(None) => {
                info!("Peer link closed");
                break;
            }
            LoopEvent::Request(Some(request)) => {
                summary.requests += 1;
                let response = handle_request(&characteristic, &mut session, request, &mut summary);
                transport.send(response).await?;
            }
            LoopEvent::Idle => trace!(connected = session.is_some(), "Idle"),
        }
    }

    if let Some(session) = session {
        debug!(%session, "Dropping open session");
    }
    info!(
        requests = summary.requests,
        writes = summary.writes,
        refused = summary.refused,
        "Serve loop finished"
    );
    Ok(summary)
}

fn handle_request(
    characteristic: &Characteristic,
    session: &mut Option<SessionId>,
    request: PeerRequest,
    summary: &mut ServeSummary,
) -> PeerResponse {
    let connected = *session;
    let response = match (request, connected) {
        (PeerRequest::Connect { .. }, Some(current)) => {
            warn!(session = %current, "Connect while a peer is already connected");
            PeerResponse::error("already connected")
        }
        (PeerRequest::Connect { peer }, None) => {
            let id = SessionId::new();
            info!(session = %id, peer = peer.as_deref().unwrap_or("unknown"), "Peer connected");
            *session = Some(id);
            characteristic.on_connect();
            PeerResponse::Connected {
                session: id,
                device_name: characteristic.profile().device_name.clone(),
            }
        }
        (PeerRequest::Disconnect, Some(_)) => {
            if let Some(id) = session.take() {
                info!(session = %id, "Peer disconnected");
            }
            PeerResponse::Disconnected
        }
        (_, None) => PeerResponse::error("not connected"),
        (PeerRequest::Read, Some(_)) => {
            summary.reads += 1;
            let encoded = characteristic.read_encoded();
            PeerResponse::Value {
                truncated: encoded.is_truncated(),
                value: encoded.into_bytes().to_vec(),
            }
        }
        (PeerRequest::Write { value }, Some(_)) => {
            summary.writes += 1;
            PeerResponse::write_result(&characteristic.write_value(&value))
        }
    };

    if matches!(response, PeerResponse::Error { .. }) {
        summary.refused += 1;
    }
    response
}
