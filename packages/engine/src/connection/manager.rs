// packages/engine/src/connection/manager.rs
//! Per-identity connection lifecycle
//!
//! Every identity with a connection has one driver task. The driver owns the
//! link, the heartbeat and the scheduler, so dropping the session tears all
//! three down together.
//!
//! # State machine
//!
//! ```text
//!                  ┌──────────── retry_delay ◄─────────────┐
//!                  ▼                                       │
//! Disconnected ─► Connecting ─► Handshaking ─► Active ─► ClosingError ─► Abandoned
//!                  ▲                             │          (after max_retries)
//!                  │                             ├─► ClosingClean ─► Disconnected
//!                  └──── Reauthenticating ◄──────┘
//!                     (token expiry, session ceiling)
//! ```
//!
//! The retry counter counts consecutive failures: it resets on every
//! handshake acknowledgment and after every re-login.

use crate::connection::frame::{InboundFrame, OutboundFrame};
use crate::connection::transport::{LinkEvent, TransportLink};
use crate::identity::IdentityId;
use crate::runtime::scheduler::SchedulerExit;
use crate::runtime::task::RepeatingTask;
use crate::runtime::worker::WorkerContext;
use crate::utils::errors::{Result, TransportError, WorkerError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Observable connection state of one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Active,
    ClosingClean,
    ClosingError,
    Reauthenticating,

    /// Retries exhausted or re-login failed; nothing happens until the next
    /// explicit connect
    Abandoned,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Active => "active",
            ConnectionState::ClosingClean => "closing_clean",
            ConnectionState::ClosingError => "closing_error",
            ConnectionState::Reauthenticating => "reauthenticating",
            ConnectionState::Abandoned => "abandoned",
        }
    }
}

/// How a driver task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// Stopped by `close`, `connect` or shutdown
    Closed,

    /// Server closed the link normally
    ClosedClean,

    /// Reconnect attempts exhausted
    Abandoned,

    /// Re-login after expiry or the session ceiling failed
    LoginFailed,
}

struct DriverHandle {
    session: Ulid,
    cancel: CancellationToken,
    task: JoinHandle<DriverExit>,
    state: watch::Receiver<ConnectionState>,
}

/// Owns every identity's realtime connection
pub struct ConnectionManager {
    ctx: Arc<WorkerContext>,

    /// At most one driver per identity
    drivers: DashMap<IdentityId, DriverHandle>,

    /// Serializes connect/close per identity
    locks: DashMap<IdentityId, Arc<Mutex<()>>>,
}

impl ConnectionManager {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            drivers: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Log in, bind the referral code if needed, then connect
    pub async fn setup_connection(&self, id: IdentityId) -> Result<()> {
        if !self.ctx.store.contains(id) {
            return Err(WorkerError::UnknownIdentity(id));
        }

        self.ctx.login(id).await?;
        self.connect(id, 0).await
    }

    /// Open a connection for `id`, replacing any existing one
    ///
    /// `retry_attempt` is the number of consecutive failures already spent.
    pub async fn connect(&self, id: IdentityId, retry_attempt: u32) -> Result<()> {
        if !self.ctx.store.contains(id) {
            return Err(WorkerError::UnknownIdentity(id));
        }

        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        if let Some(exit) = self.stop_driver(id).await {
            debug!(
                "[{}] Replaced previous connection ({:?})",
                self.ctx.store.display_name(id),
                exit
            );
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let session = Ulid::new();

        let driver = ConnectionDriver {
            ctx: Arc::clone(&self.ctx),
            id,
            name: self.ctx.store.display_name(id),
            session,
            cancel: cancel.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(driver.run(retry_attempt));

        self.drivers.insert(
            id,
            DriverHandle {
                session,
                cancel,
                task,
                state: state_rx,
            },
        );
        Ok(())
    }

    /// Close the connection for `id` and stop its retries
    pub async fn close(&self, id: IdentityId) -> Option<DriverExit> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.stop_driver(id).await
    }

    /// Close every connection
    pub async fn shutdown(&self) {
        let ids: Vec<IdentityId> = self.drivers.iter().map(|entry| *entry.key()).collect();
        info!("Closing {} connections", ids.len());

        for id in ids {
            self.close(id).await;
        }
    }

    pub fn state(&self, id: IdentityId) -> ConnectionState {
        self.drivers
            .get(&id)
            .map(|handle| *handle.state.borrow())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Subscribe to state changes of the current driver
    pub fn watch_state(&self, id: IdentityId) -> Option<watch::Receiver<ConnectionState>> {
        self.drivers.get(&id).map(|handle| handle.state.clone())
    }

    /// Identifier of the current driver session, if any
    pub fn session_id(&self, id: IdentityId) -> Option<Ulid> {
        self.drivers.get(&id).map(|handle| handle.session)
    }

    /// Identities that have a driver (running or finished)
    pub fn connection_count(&self) -> usize {
        self.drivers.len()
    }

    fn lock_for(&self, id: IdentityId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    async fn stop_driver(&self, id: IdentityId) -> Option<DriverExit> {
        let (_, handle) = self.drivers.remove(&id)?;
        handle.cancel.cancel();

        match handle.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!(
                    "[{}] Connection task failed: {}",
                    self.ctx.store.display_name(id),
                    e
                );
                None
            }
        }
    }
}

/// Why a single link session ended
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    ClosedClean(String),
    Failed(String),

    /// Needs a fresh login before reconnecting
    Rekey(&'static str),
}

struct ConnectionDriver {
    ctx: Arc<WorkerContext>,
    id: IdentityId,
    name: String,
    session: Ulid,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionDriver {
    async fn run(self, mut attempt: u32) -> DriverExit {
        let max_retries = self.ctx.config.connection.max_retries;
        debug!("[{}] Connection driver {} started", self.name, self.session);

        loop {
            if attempt >= max_retries {
                error!(
                    "[{}] Max reconnection attempts reached ({}), giving up",
                    self.name, max_retries
                );
                self.set_state(ConnectionState::Abandoned);
                return DriverExit::Abandoned;
            }

            self.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return self.stopped(),
                opened = self.ctx.transport.open() => opened,
            };

            let end = match opened {
                Ok(link) => {
                    info!("[{}] Connection established", self.name);
                    self.run_session(link, &mut attempt).await
                }
                Err(e) => SessionEnd::Failed(e.to_string()),
            };

            match end {
                SessionEnd::Cancelled => return self.stopped(),
                SessionEnd::ClosedClean(detail) => {
                    info!("[{}] Connection closed cleanly ({})", self.name, detail);
                    self.set_state(ConnectionState::Disconnected);
                    return DriverExit::ClosedClean;
                }
                SessionEnd::Failed(reason) => {
                    attempt += 1;
                    metrics::counter!("tapfarm_reconnects_total").increment(1);
                    if attempt >= max_retries {
                        warn!("[{}] Connection failed: {}", self.name, reason);
                        continue;
                    }

                    let delay = self.ctx.config.connection.retry_delay();
                    warn!(
                        "[{}] Connection failed: {}. Reconnecting in {:?} (attempt {}/{})",
                        self.name, reason, delay, attempt, max_retries
                    );
                    if !self.pause(delay).await {
                        return self.stopped();
                    }
                }
                SessionEnd::Rekey(reason) => {
                    info!("[{}] {}, logging in again", self.name, reason);
                    self.set_state(ConnectionState::Reauthenticating);

                    let login = tokio::select! {
                        _ = self.cancel.cancelled() => return self.stopped(),
                        login = self.ctx.login(self.id) => login,
                    };
                    if let Err(e) = login {
                        error!(
                            "[{}] Re-login failed, abandoning connection: {}",
                            self.name, e
                        );
                        self.set_state(ConnectionState::Abandoned);
                        return DriverExit::LoginFailed;
                    }
                    attempt = 0;
                }
            }
        }
    }

    /// Drive one open link until it ends
    async fn run_session(&self, link: TransportLink, attempt: &mut u32) -> SessionEnd {
        let TransportLink { sender, mut events } = link;
        let session_cancel = self.cancel.child_token();

        // Announce identity
        let token = self.ctx.store.access_token(self.id).unwrap_or_default();
        if let Err(e) = sender.send(&OutboundFrame::Announce { token }) {
            return SessionEnd::Failed(e.to_string());
        }
        debug!("[{}] Sent identity announcement", self.name);
        self.set_state(ConnectionState::Handshaking);

        let mut heartbeat: Option<RepeatingTask> = None;
        let mut scheduler: Option<JoinHandle<SchedulerExit>> = None;

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break SessionEnd::Cancelled,

                exit = join_optional(&mut scheduler) => {
                    scheduler = None;
                    match exit {
                        Ok(SchedulerExit::TokenExpired) => {
                            break SessionEnd::Rekey("Access token expired")
                        }
                        Ok(SchedulerExit::SessionCeiling) => {
                            break SessionEnd::Rekey("Session ceiling reached")
                        }
                        Ok(SchedulerExit::Cancelled) => break SessionEnd::Cancelled,
                        Err(e) => {
                            break SessionEnd::Failed(format!("scheduler task failed: {}", e))
                        }
                    }
                }

                event = events.recv() => match event {
                    Some(LinkEvent::Frame(text)) => {
                        debug!("[{}] Message from server: {}", self.name, text);
                        if !InboundFrame::decode(&text).is_handshake_ack() {
                            continue;
                        }
                        if heartbeat.is_some() {
                            debug!("[{}] Duplicate handshake acknowledgment ignored", self.name);
                            continue;
                        }

                        info!("[{}] Handshake acknowledged, starting simulation", self.name);
                        *attempt = 0;
                        self.set_state(ConnectionState::Active);

                        let beat = sender.clone();
                        let name = self.name.clone();
                        heartbeat = Some(RepeatingTask::spawn(
                            "heartbeat",
                            self.ctx.config.connection.heartbeat_interval(),
                            session_cancel.child_token(),
                            move || match beat.send(&OutboundFrame::Heartbeat) {
                                Ok(()) => debug!("[{}] Sent heartbeat", name),
                                Err(e) => debug!("[{}] Heartbeat not sent: {}", name, e),
                            },
                        ));
                        scheduler = Some(tokio::spawn(
                            self.ctx
                                .scheduler(self.id, sender.clone())
                                .run(session_cancel.child_token()),
                        ));
                    }
                    Some(LinkEvent::Closed { clean: true, detail }) => {
                        break SessionEnd::ClosedClean(detail)
                    }
                    Some(LinkEvent::Closed { clean: false, detail }) => {
                        break SessionEnd::Failed(TransportError::UncleanClose(detail).to_string())
                    }
                    None => break SessionEnd::Failed("link dropped".to_string()),
                },
            }
        };

        // Tear down timers before the link goes away
        self.set_state(match end {
            SessionEnd::Failed(_) => ConnectionState::ClosingError,
            _ => ConnectionState::ClosingClean,
        });
        session_cancel.cancel();
        if let Some(task) = heartbeat.take() {
            task.stop().await;
        }
        if let Some(task) = scheduler.take() {
            task.abort();
            let _ = task.await;
        }
        sender.close();

        end
    }

    /// Sleep unless cancelled first; false when cancelled
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn stopped(&self) -> DriverExit {
        debug!("[{}] Connection driver {} stopped", self.name, self.session);
        self.set_state(ConnectionState::Disconnected);
        DriverExit::Closed
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                "[{}] Connection state {} -> {}",
                self.name,
                previous.as_str(),
                state.as_str()
            );
        }
    }
}

/// Await the task if there is one; pending forever otherwise
async fn join_optional<T>(task: &mut Option<JoinHandle<T>>) -> std::result::Result<T, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
