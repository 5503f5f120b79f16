use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::drag::{DragController, Gesture, GestureConfig, PointerInput};
use crate::item::{Item, ItemKey};
use crate::store::{BoardStore, LoadReport, MoveError, MoveOutcome, PendingMove};
use crate::sync::{SyncAdapter, SyncError};

pub type DetailCallback = Arc<dyn Fn(&Item) + Send + Sync>;

type Persisted = (ItemKey, Result<MoveOutcome, MoveError>);

/// What a pointer interaction amounted to, as seen by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    DetailOpened(ItemKey),
    DragStarted(ItemKey),
    DragCancelled(ItemKey),
    Moved(ItemKey),
    Unchanged(ItemKey),
    /// Dropped somewhere that cannot take the item; nothing changed.
    Discarded(ItemKey),
    /// The backend refused the move and the board has already been rolled
    /// back.
    Failed {
        item: ItemKey,
        message: String,
        retryable: bool,
    },
}

/// One interactive surface: gesture handling in front of the shared store
/// and the backend it syncs to.
///
/// Committed drags are applied to the store at once. The backend call runs
/// as its own task, which also confirms or rolls back the move, and the
/// outcome comes back over `persisted_rx` while input keeps flowing.
pub struct Board<A: SyncAdapter + ?Sized> {
    store: Arc<BoardStore>,
    adapter: Arc<A>,
    controller: DragController,
    on_detail: Option<DetailCallback>,
    last_error: Option<String>,
    persisted_tx: mpsc::UnboundedSender<Persisted>,
    persisted_rx: mpsc::UnboundedReceiver<Persisted>,
    in_flight: usize,
}

impl<A: SyncAdapter + ?Sized + 'static> Board<A> {
    pub fn new(store: Arc<BoardStore>, adapter: Arc<A>, gestures: GestureConfig) -> Self {
        let (persisted_tx, persisted_rx) = mpsc::unbounded_channel();
        Self {
            store,
            adapter,
            controller: DragController::new(gestures),
            on_detail: None,
            last_error: None,
            persisted_tx,
            persisted_rx,
            in_flight: 0,
        }
    }

    pub fn with_detail_callback(mut self, callback: DetailCallback) -> Self {
        self.on_detail = Some(callback);
        self
    }

    pub fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    pub fn controller(&self) -> &DragController {
        &self.controller
    }

    /// The most recent user-facing failure, already rolled back.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Moves applied locally whose backend call has not answered yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<LoadReport, SyncError> {
        let records = self.adapter.fetch_items().await?;
        Ok(self.store.load(records))
    }

    /// Drops that commit a move spawn their persist onto the current tokio
    /// runtime; the outcome is reported by `run` or `finish_in_flight`.
    pub fn handle(&mut self, input: PointerInput, now: Instant) -> Vec<BoardEvent> {
        let gestures = self.controller.handle(input, now);
        self.settle(gestures)
    }

    /// Fires the long-press timer if it is due.
    pub fn tick(&mut self, now: Instant) -> Vec<BoardEvent> {
        let gestures: Vec<Gesture> = self.controller.poll_timer(now).into_iter().collect();
        self.settle(gestures)
    }

    /// Waits for every outstanding backend call and reports how each move
    /// ended.
    pub async fn finish_in_flight(&mut self) -> Vec<BoardEvent> {
        let mut events = Vec::with_capacity(self.in_flight);
        while self.in_flight > 0 {
            match self.persisted_rx.recv().await {
                Some(done) => events.push(self.persisted(done)),
                None => break,
            }
        }
        events
    }

    /// Feeds pointer input from `inputs` until the sender goes away,
    /// waking up on its own when a long press comes due or a backend call
    /// answers. Moves still in flight at that point are waited for.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<PointerInput>) -> Vec<BoardEvent> {
        let mut log = Vec::new();
        loop {
            let deadline = self.controller.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let waiting = self.in_flight > 0;

            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => log.extend(self.handle(input, Instant::now())),
                    None => break,
                },
                () = timer => log.extend(self.tick(Instant::now())),
                Some(done) = self.persisted_rx.recv(), if waiting => {
                    log.push(self.persisted(done));
                }
            }
        }
        debug!(in_flight = self.in_flight, "pointer input closed");
        log.extend(self.finish_in_flight().await);
        log
    }

    fn settle(&mut self, gestures: Vec<Gesture>) -> Vec<BoardEvent> {
        let mut events = Vec::with_capacity(gestures.len());
        for gesture in gestures {
            let event = match gesture {
                Gesture::OpenDetail(key) => {
                    self.open_detail(&key);
                    BoardEvent::DetailOpened(key)
                }
                Gesture::DragStarted(key) => BoardEvent::DragStarted(key),
                Gesture::Cancelled(key) => BoardEvent::DragCancelled(key),
                Gesture::Commit(request) => {
                    let key = request.item.clone();
                    match self.store.begin_move(request) {
                        Ok(Some(pending)) => {
                            self.spawn_persist(pending);
                            continue;
                        }
                        Ok(None) => BoardEvent::Unchanged(key),
                        Err(err) => self.failure(key, err),
                    }
                }
            };
            events.push(event);
        }
        events
    }

    fn spawn_persist(&mut self, pending: PendingMove) {
        debug!(item = %pending.request.item, ticket = %pending.ticket, "persisting move");
        let store = Arc::clone(&self.store);
        let adapter = Arc::clone(&self.adapter);
        let done = self.persisted_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let key = pending.request.item.clone();
            let result = adapter.persist_move(&pending.persist).await;
            let outcome = store.finish_move(pending, result);
            done.send((key, outcome)).ok();
        });
    }

    fn persisted(&mut self, (key, outcome): Persisted) -> BoardEvent {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome {
            Ok(_) => {
                self.last_error = None;
                BoardEvent::Moved(key)
            }
            Err(err) => self.failure(key, err),
        }
    }

    fn open_detail(&self, key: &ItemKey) {
        let state = self.store.snapshot();
        let Some(item) = state.item(key) else {
            warn!(item = %key, "tapped item is no longer on the board");
            return;
        };
        if let Some(callback) = &self.on_detail {
            callback(item);
        }
    }

    fn failure(&mut self, key: ItemKey, err: MoveError) -> BoardEvent {
        if err.is_silent() {
            debug!(item = %key, error = %err, "discarding drop");
            return BoardEvent::Discarded(key);
        }
        let message = err.to_string();
        info!(item = %key, error = %message, "move failed");
        self.last_error = Some(message.clone());
        BoardEvent::Failed {
            item: key,
            retryable: err.is_retryable(),
            message,
        }
    }
}
