use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::control::StateRefresher;
use crate::error::ApiResult;
use crate::gateway::GatewayApi;
use crate::normalize::normalize;
use crate::registry::LinkRegistry;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    SnapshotApplied { seq: u64, entities: usize },
    PollFailed(String),
    /// Credentials were rejected. Polling stops until restarted.
    Unauthorized,
}

/// Fetches gateway state and feeds it into the registry.
///
/// Every request gets a sequence number when it is issued. A result is
/// applied only if no later request has been applied already, and never
/// after the owning session has shut down.
#[derive(Clone)]
pub struct Poller {
    name: String,
    gateway: Arc<dyn GatewayApi>,
    registry: Arc<Mutex<LinkRegistry>>,
    seq: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl Poller {
    pub fn new(
        name: &str,
        gateway: Arc<dyn GatewayApi>,
        registry: Arc<Mutex<LinkRegistry>>,
        events: broadcast::Sender<SessionEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_string(),
            gateway,
            registry,
            seq: Arc::new(AtomicU64::new(0)),
            events,
            shutdown,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Runs one poll. Returns whether its result was applied.
    pub async fn poll_once(&self) -> ApiResult<bool> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("[{}] Poll #{seq}", self.name);

        let raw = match self.gateway.fetch_states().await {
            Ok(raw) => raw,
            Err(err) => {
                if err.is_unauthorized() {
                    log::error!("[{}] Gateway rejected credentials: {err}", self.name);
                    self.publish(SessionEvent::Unauthorized);
                } else {
                    log::warn!("[{}] Poll #{seq} failed: {err}", self.name);
                    self.publish(SessionEvent::PollFailed(err.to_string()));
                }
                return Err(err);
            }
        };

        if self.shutdown.is_cancelled() {
            log::debug!("[{}] Dropping poll #{seq}: session closed", self.name);
            return Ok(false);
        }

        let entities = normalize(&raw);
        let count = entities.len();
        let applied = self.registry.lock().await.apply_snapshot(seq, entities);
        if applied {
            log::debug!("[{}] Poll #{seq}: {count} entities", self.name);
            self.publish(SessionEvent::SnapshotApplied {
                seq,
                entities: count,
            });
        }
        Ok(applied)
    }

    /// Polls on `interval` until `token` is cancelled or the gateway
    /// rejects the credentials. The first poll happens immediately.
    pub async fn run(self, interval: Duration, token: CancellationToken) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("[{}] Polling every {:?}", self.name, interval);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = timer.tick() => {}
            }

            let res = tokio::select! {
                () = token.cancelled() => break,
                res = self.poll_once() => res,
            };

            if let Err(err) = res {
                if err.is_unauthorized() {
                    token.cancel();
                    break;
                }
            }
        }
        log::info!("[{}] Polling stopped", self.name);
    }
}

#[async_trait]
impl StateRefresher for Poller {
    async fn refresh(&self) -> ApiResult<()> {
        self.poll_once().await.map(|_| ())
    }
}
