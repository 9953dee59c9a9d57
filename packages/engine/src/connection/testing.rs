// packages/engine/src/connection/testing.rs
//! In-memory transport for unit tests
//!
//! Every opened link gets a small server task that records outbound frames
//! and, unless disabled, acknowledges the identity announcement.

use crate::connection::frame::HANDSHAKE_PREFIX;
use crate::connection::transport::{FrameSender, LinkCommand, LinkEvent, Transport, TransportLink};
use crate::utils::errors::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct MockLink {
    events: mpsc::UnboundedSender<LinkEvent>,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct Shared {
    open_failures: AtomicU32,
    fail_always: AtomicBool,
    silent: AtomicBool,
    opens: AtomicUsize,
    links: Mutex<Vec<MockLink>>,
    sent: Mutex<Vec<(usize, String)>>,
}

/// Transport fake with scripted open failures and inspectable links
#[derive(Default, Clone)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never acknowledge announcements
    pub fn silent(self) -> Self {
        self.shared.silent.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the next `times` opens
    pub fn fail_opens(&self, times: u32) {
        self.shared.open_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.shared.fail_always.store(true, Ordering::SeqCst);
    }

    /// Open attempts, failed ones included
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Links opened successfully
    pub fn link_count(&self) -> usize {
        self.shared.links.lock().len()
    }

    /// Links neither side has closed yet
    pub fn live_links(&self) -> usize {
        self.shared
            .links
            .lock()
            .iter()
            .filter(|link| !link.closed.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_live(&self, link: usize) -> bool {
        self.shared
            .links
            .lock()
            .get(link)
            .map(|link| !link.closed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Frames the client sent on `link`
    pub fn sent_on(&self, link: usize) -> Vec<String> {
        self.shared
            .sent
            .lock()
            .iter()
            .filter(|(index, _)| *index == link)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Frames the client sent on every link
    pub fn all_sent(&self) -> Vec<String> {
        self.shared
            .sent
            .lock()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Push a server frame to `link`
    pub fn push_frame(&self, link: usize, text: &str) {
        if let Some(link) = self.shared.links.lock().get(link) {
            let _ = link.events.send(LinkEvent::Frame(text.to_string()));
        }
    }

    /// Close `link` from the server side
    pub fn drop_link(&self, link: usize, clean: bool) {
        if let Some(link) = self.shared.links.lock().get(link) {
            link.closed.store(true, Ordering::SeqCst);
            let _ = link.events.send(LinkEvent::Closed {
                clean,
                detail: "closed by mock server".to_string(),
            });
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let shared = Arc::clone(&self.shared);
        shared.opens.fetch_add(1, Ordering::SeqCst);

        if shared.fail_always.load(Ordering::SeqCst)
            || shared
                .open_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(TransportError::Connect("scripted failure".to_string()));
        }

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let index = {
            let mut links = shared.links.lock();
            links.push(MockLink {
                events: event_tx.clone(),
                closed: Arc::clone(&closed),
            });
            links.len() - 1
        };

        let server = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    LinkCommand::Send(text) => {
                        let announce = text.starts_with(HANDSHAKE_PREFIX);
                        server.sent.lock().push((index, text));
                        if announce && !server.silent.load(Ordering::SeqCst) {
                            let _ = event_tx.send(LinkEvent::Frame(r#"40{"sid":"mock"}"#.into()));
                        }
                    }
                    LinkCommand::Close => break,
                }
            }
            closed.store(true, Ordering::SeqCst);
        });

        Ok(TransportLink {
            sender: FrameSender::new(command_tx),
            events: event_rx,
        })
    }
}
