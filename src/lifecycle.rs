// Optimistic send lifecycle.
//
// Confirmed messages live in the MessageStore. Every submission that is still
// waiting on its remote call sits in the pending list, keyed by its temporary
// id. The view handed to the UI is always rebuilt from those two pieces:
// confirmed messages first, then visible pending entries in submission order.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{DeliveryStatus, Message, SendMode, StatusError};
use crate::store::{MessageStore, StoreError};
use crate::transport::{RemoteSend, SendError};

/// Temporary id of a submission that has not settled yet
pub type LocalId = String;

const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A submission was accepted and its remote call started
    Submitted { local_id: LocalId },
    /// The remote call finished and `message` is now in the store
    Settled { local_id: LocalId, message: Message },
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no pending submission with id {0}")]
    UnknownSubmission(LocalId),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
struct PendingSubmission {
    message: Message,
    // Confirmed mode submissions are tracked but never shown
    visible: bool,
}

/// Everything the lifecycle mutates, behind one lock
#[derive(Debug, Default)]
pub struct ChatState {
    store: MessageStore,
    pending: Vec<PendingSubmission>,
    mode: SendMode,
}

impl ChatState {
    pub fn new(store: MessageStore, mode: SendMode) -> Self {
        Self {
            store,
            pending: Vec::new(),
            mode,
        }
    }

    /// Record a pending entry for `text` and return its temporary id.
    /// Returns None when the text is blank, or in confirmed mode while a send is in flight.
    pub fn begin(&mut self, text: &str) -> Option<LocalId> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank submission");
            return None;
        }

        if self.mode == SendMode::Confirmed && !self.pending.is_empty() {
            info!("Ignoring submission while another send is in flight");
            return None;
        }

        let message = Message::sending(text);
        let local_id = message.id.clone();
        self.pending.push(PendingSubmission {
            message,
            visible: self.mode == SendMode::Optimistic,
        });

        Some(local_id)
    }

    /// Settle a pending submission. Removing the pending entry and appending the
    /// final record happen together, so the view never holds both or neither.
    /// A confirmation the store cannot take settles the submission as Failed.
    pub fn reconcile(
        &mut self,
        local_id: &str,
        outcome: Result<Message, SendError>,
    ) -> Result<Message, LifecycleError> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.message.id == local_id)
            .ok_or_else(|| LifecycleError::UnknownSubmission(local_id.to_string()))?;
        let pending = self.pending.remove(idx).message;

        match outcome {
            Ok(confirmed) => match self.accept(&pending, confirmed) {
                Ok(settled) => {
                    info!("Message {} confirmed as {}", local_id, settled.id);
                    return Ok(settled);
                }
                Err(e) => warn!("Rejected confirmation for message {}: {}", local_id, e),
            },
            Err(e) => warn!("Message {} could not be sent: {}", local_id, e),
        }

        let failed = pending.into_failed()?;
        self.store.append(failed.clone())?;
        Ok(failed)
    }

    fn accept(&mut self, pending: &Message, confirmed: Message) -> Result<Message, LifecycleError> {
        pending.status.advance(confirmed.status)?;
        self.store.append(confirmed.clone())?;
        Ok(confirmed)
    }

    /// Confirmed messages followed by visible pending entries, built fresh.
    pub fn view(&self) -> Vec<Message> {
        self.store
            .messages()
            .iter()
            .cloned()
            .chain(
                self.pending
                    .iter()
                    .filter(|p| p.visible)
                    .map(|p| p.message.clone()),
            )
            .collect()
    }

    pub fn confirmed(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SendMode) {
        self.mode = mode;
    }

    /// Text of a failed message that may be sent again as a new submission
    pub fn failed_text(&self, id: &str) -> Option<String> {
        self.store
            .find(id)
            .filter(|m| m.status == DeliveryStatus::Failed)
            .map(|m| m.text.clone())
    }

    pub fn last_failed_id(&self) -> Option<String> {
        self.store.last_failed().map(|m| m.id.clone())
    }
}

struct Shared {
    state: ChatState,
    tasks: HashMap<LocalId, JoinHandle<()>>,
}

/// Drives submissions against a remote sender and keeps the merged view current
#[derive(Clone)]
pub struct OptimisticChat {
    shared: Arc<Mutex<Shared>>,
    transport: Arc<dyn RemoteSend>,
    event_tx: mpsc::Sender<ChatEvent>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OptimisticChat {
    pub fn new(
        transport: Arc<dyn RemoteSend>,
        mode: SendMode,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        Self::with_history(transport, mode, Vec::new())
    }

    /// Start from an existing conversation, such as `models::initial_messages()`.
    pub fn with_history(
        transport: Arc<dyn RemoteSend>,
        mode: SendMode,
        history: Vec<Message>,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let shared = Shared {
            state: ChatState::new(MessageStore::with_messages(history), mode),
            tasks: HashMap::new(),
        };

        (
            Self {
                shared: Arc::new(Mutex::new(shared)),
                transport,
                event_tx,
            },
            event_rx,
        )
    }

    /// Submit `text` for sending. Returns at once; the pending entry is already
    /// part of the view when this returns. Must be called inside a tokio runtime.
    pub fn submit(&self, text: &str) -> Option<LocalId> {
        let local_id = {
            let mut shared = lock(&self.shared);
            let local_id = shared.state.begin(text)?;

            let handle = tokio::spawn(Self::settle(
                self.shared.clone(),
                self.transport.clone(),
                self.event_tx.clone(),
                local_id.clone(),
                text.trim().to_string(),
            ));
            shared.tasks.insert(local_id.clone(), handle);
            local_id
        };

        debug!("Submitted message {}", local_id);
        if let Err(e) = self.event_tx.try_send(ChatEvent::Submitted {
            local_id: local_id.clone(),
        }) {
            debug!("Dropped submit notification: {}", e);
        }

        Some(local_id)
    }

    /// Send a failed message again. The failed record stays; a new submission starts.
    pub fn resubmit(&self, failed_id: &str) -> Option<LocalId> {
        let text = lock(&self.shared).state.failed_text(failed_id);
        match text {
            Some(text) => {
                info!("Resubmitting failed message {}", failed_id);
                self.submit(&text)
            }
            None => {
                debug!("Nothing to resubmit for {}", failed_id);
                None
            }
        }
    }

    /// Resubmit the most recent failed message, if any.
    pub fn resubmit_last_failed(&self) -> Option<LocalId> {
        let failed_id = lock(&self.shared).state.last_failed_id()?;
        self.resubmit(&failed_id)
    }

    async fn settle(
        shared: Arc<Mutex<Shared>>,
        transport: Arc<dyn RemoteSend>,
        event_tx: mpsc::Sender<ChatEvent>,
        local_id: LocalId,
        text: String,
    ) {
        let outcome = transport.send(&text).await;

        let settled = {
            let mut shared = lock(&shared);
            shared.tasks.remove(&local_id);
            shared.state.reconcile(&local_id, outcome)
        };

        match settled {
            Ok(message) => {
                // The view is read from state, a dropped notification only delays a redraw
                if let Err(e) = event_tx.try_send(ChatEvent::Settled { local_id, message }) {
                    debug!("Dropped settle notification: {}", e);
                }
            }
            Err(e) => error!("Failed to settle message {}: {}", local_id, e),
        }
    }

    pub fn view(&self) -> Vec<Message> {
        lock(&self.shared).state.view()
    }

    pub fn confirmed(&self) -> Vec<Message> {
        lock(&self.shared).state.confirmed().to_vec()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.shared).state.is_pending()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared).state.pending_count()
    }

    pub fn mode(&self) -> SendMode {
        lock(&self.shared).state.mode()
    }

    /// Only affects later submissions.
    pub fn set_mode(&self, mode: SendMode) {
        info!("Send mode set to {}", mode.label());
        lock(&self.shared).state.set_mode(mode);
    }

    /// Abort every in-flight remote call. Aborted submissions never settle.
    pub fn shutdown(&self) {
        let mut shared = lock(&self.shared);
        for (local_id, handle) in shared.tasks.drain() {
            debug!("Aborting send of {}", local_id);
            handle.abort();
        }
    }
}
