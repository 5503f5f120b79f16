use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tack_shared::{ItemRecord, PersistMoveArgs, Variant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::item::{ContainerId, Item, ItemKey, Status, persist_args, status_to_column};
use crate::sync::{SyncAdapter, SyncError};

/// A request to reposition one item, as produced by a committed drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub item: ItemKey,
    pub from: ContainerId,
    pub to: ContainerId,
    pub to_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("unknown item {0}")]
    UnknownItem(ItemKey),
    #[error("{item} is not in {container}")]
    NotInContainer {
        item: ItemKey,
        container: ContainerId,
    },
    #[error("{item} cannot be dropped on {target}")]
    InvalidTarget { item: ItemKey, target: ContainerId },
    #[error("{0} already has a move waiting for the server")]
    InFlight(ItemKey),
    #[error("failed to update {title}: {source}")]
    Persist {
        item: ItemKey,
        title: String,
        #[source]
        source: SyncError,
    },
}

impl MoveError {
    /// Drops on targets that cannot take the item are discarded without
    /// telling the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, MoveError::InvalidTarget { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MoveError::Persist { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionViolation {
    #[error("{container} references unknown item {item}")]
    Orphan { item: ItemKey, container: ContainerId },
    #[error("{item} appears {count} times on its {surface}")]
    Duplicate {
        item: ItemKey,
        surface: &'static str,
        count: usize,
    },
    #[error("{item} is missing from its {surface}")]
    Missing { item: ItemKey, surface: &'static str },
    #[error("{item} sits in {container} but its field says otherwise")]
    Misplaced { item: ItemKey, container: ContainerId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub rejected: usize,
}

/// Items plus every grouping over them: one column per status of every
/// variant, and one calendar cell per date that holds something.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    items: BTreeMap<ItemKey, Item>,
    containers: BTreeMap<ContainerId, Vec<ItemKey>>,
}

impl BoardState {
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut state = BoardState::default();
        for variant in Variant::ALL {
            for status in Status::all(variant) {
                state.containers.insert(status_to_column(status), vec![]);
            }
        }

        for item in items {
            if state.items.contains_key(&item.key) {
                warn!(item = %item.key, "duplicate item in feed; keeping first");
                continue;
            }
            state
                .containers
                .entry(item.column())
                .or_default()
                .push(item.key.clone());
            if let Some(day) = item.day() {
                state.containers.entry(day).or_default().push(item.key.clone());
            }
            state.items.insert(item.key.clone(), item);
        }
        state
    }

    pub fn item(&self, key: &ItemKey) -> Option<&Item> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn container(&self, id: &ContainerId) -> &[ItemKey] {
        self.containers.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn day(&self, date: NaiveDate) -> &[ItemKey] {
        self.container(&ContainerId::Day(date))
    }

    /// Columns of one variant's board, in status order.
    pub fn board(&self, variant: Variant) -> Vec<(Status, &[ItemKey])> {
        Status::all(variant)
            .into_iter()
            .map(|status| (status, self.container(&status_to_column(status))))
            .collect()
    }

    /// Every container and its contents; used to compare groupings.
    pub fn grouping(&self) -> &BTreeMap<ContainerId, Vec<ItemKey>> {
        &self.containers
    }

    /// Where `key` sits on the surface that `like` belongs to.
    pub fn locate(&self, key: &ItemKey, like: &ContainerId) -> Option<(ContainerId, usize)> {
        let container = self.items.get(key)?.placement_like(like)?;
        let index = self
            .container(&container)
            .iter()
            .position(|candidate| candidate == key)?;
        Some((container, index))
    }

    /// Request that moves `key` to the end of its next status column.
    pub fn advance_request(&self, key: &ItemKey) -> Result<MoveRequest, MoveError> {
        let item = self
            .items
            .get(key)
            .ok_or_else(|| MoveError::UnknownItem(key.clone()))?;
        let to = status_to_column(item.status.next());
        Ok(MoveRequest {
            item: key.clone(),
            from: item.column(),
            to,
            to_index: self.container(&to).len(),
        })
    }

    pub fn verify_partition(&self) -> Result<(), PartitionViolation> {
        let mut columns: BTreeMap<&ItemKey, usize> = BTreeMap::new();
        let mut days: BTreeMap<&ItemKey, usize> = BTreeMap::new();

        for (container, keys) in &self.containers {
            for key in keys {
                let item = self.items.get(key).ok_or_else(|| PartitionViolation::Orphan {
                    item: key.clone(),
                    container: *container,
                })?;
                if item.placement_like(container) != Some(*container) {
                    return Err(PartitionViolation::Misplaced {
                        item: key.clone(),
                        container: *container,
                    });
                }
                let counts = if container.is_day() {
                    &mut days
                } else {
                    &mut columns
                };
                *counts.entry(key).or_default() += 1;
            }
        }

        for (key, item) in &self.items {
            check_count(key, columns.get(key).copied().unwrap_or(0), 1, "board")?;
            let wanted = usize::from(item.is_calendar_eligible());
            check_count(key, days.get(key).copied().unwrap_or(0), wanted, "calendar")?;
        }
        Ok(())
    }

    fn apply_move(&self, request: &MoveRequest) -> Result<Option<BoardState>, MoveError> {
        let item = self
            .items
            .get(&request.item)
            .ok_or_else(|| MoveError::UnknownItem(request.item.clone()))?;
        if !request.to.accepts(item.key.variant) || !request.from.same_surface(&request.to) {
            return Err(MoveError::InvalidTarget {
                item: request.item.clone(),
                target: request.to,
            });
        }

        let origin = self
            .container(&request.from)
            .iter()
            .position(|key| key == &request.item)
            .ok_or_else(|| MoveError::NotInContainer {
                item: request.item.clone(),
                container: request.from,
            })?;

        if request.from == request.to {
            let last = self.container(&request.from).len() - 1;
            if request.to_index.min(last) == origin {
                return Ok(None);
            }
        }

        let mut next = self.clone();
        next.detach(&request.item, &request.from, origin);
        next.attach(request.item.clone(), request.to, request.to_index);
        if let Some(moved) = next.items.get_mut(&request.item) {
            moved.place_in(&request.to);
        }
        Ok(Some(next))
    }

    /// Puts `previous`'s placement on the surface of `like` back, leaving
    /// every other item where it is now.
    fn revert_item(&self, previous: &Item, like: &ContainerId, origin_index: usize) -> BoardState {
        let mut next = self.clone();
        if let Some((current, index)) = self.locate(&previous.key, like) {
            next.detach(&previous.key, &current, index);
        }
        let Some(item) = next.items.get_mut(&previous.key) else {
            return next;
        };
        if like.is_day() {
            item.scheduled = previous.scheduled;
        } else {
            item.status = previous.status;
        }
        if let Some(origin) = item.placement_like(like) {
            next.attach(previous.key.clone(), origin, origin_index);
        }
        next
    }

    fn detach(&mut self, key: &ItemKey, container: &ContainerId, index: usize) {
        let emptied = match self.containers.get_mut(container) {
            Some(keys) if keys.get(index) == Some(key) => {
                keys.remove(index);
                keys.is_empty()
            }
            _ => false,
        };
        if emptied && container.is_day() {
            self.containers.remove(container);
        }
    }

    fn attach(&mut self, key: ItemKey, container: ContainerId, index: usize) {
        let keys = self.containers.entry(container).or_default();
        let index = index.min(keys.len());
        keys.insert(index, key);
    }
}

fn check_count(
    key: &ItemKey,
    found: usize,
    wanted: usize,
    surface: &'static str,
) -> Result<(), PartitionViolation> {
    if found == wanted {
        Ok(())
    } else if found > wanted {
        Err(PartitionViolation::Duplicate {
            item: key.clone(),
            surface,
            count: found,
        })
    } else {
        Err(PartitionViolation::Missing {
            item: key.clone(),
            surface,
        })
    }
}

/// An optimistic move that is waiting for the backend. Hand it back to
/// [`BoardStore::confirm`] or [`BoardStore::rollback`].
#[must_use]
#[derive(Debug)]
pub struct PendingMove {
    pub ticket: Uuid,
    pub request: MoveRequest,
    pub persist: PersistMoveArgs,
    snapshot: Arc<BoardState>,
    applied_generation: u64,
    previous: Item,
    origin_index: usize,
}

impl PendingMove {
    /// The grouping as it was immediately before this move.
    pub fn snapshot(&self) -> &Arc<BoardState> {
        &self.snapshot
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Arc<BoardState>,
    generation: u64,
    in_flight: BTreeSet<ItemKey>,
}

impl Inner {
    fn publish(&mut self, next: Arc<BoardState>) {
        if let Err(violation) = next.verify_partition() {
            error!(%violation, generation = self.generation, "board partition violated");
            if cfg!(debug_assertions) {
                panic!("board partition violated: {violation}");
            }
        }
        self.state = next;
        self.generation += 1;
    }
}

/// Working copy of the board. Readers take whole snapshots; writers
/// replace the snapshot in one step, so a half-applied move is never
/// visible.
#[derive(Debug, Default)]
pub struct BoardStore {
    inner: Mutex<Inner>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<BoardState> {
        Arc::clone(&self.inner.lock().state)
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_in_flight(&self, key: &ItemKey) -> bool {
        self.inner.lock().in_flight.contains(key)
    }

    /// Replaces the whole working copy with the feed's contents. Rows that
    /// fail validation are skipped.
    #[tracing::instrument(skip(self, records), fields(rows = records.len()))]
    pub fn load(&self, records: Vec<ItemRecord>) -> LoadReport {
        let mut report = LoadReport::default();
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match Item::from_record(record) {
                Ok(item) => items.push(item),
                Err(err) => {
                    warn!(error = %err, "skipping invalid feed row");
                    report.rejected += 1;
                }
            }
        }
        let state = BoardState::from_items(items);
        report.loaded = state.len();

        let mut inner = self.inner.lock();
        inner.publish(Arc::new(state));
        info!(
            loaded = report.loaded,
            rejected = report.rejected,
            generation = inner.generation,
            "loaded board"
        );
        report
    }

    /// First phase: applies the move locally and returns what is needed to
    /// settle it later. `Ok(None)` means the move changes nothing.
    #[tracing::instrument(skip(self), fields(item = %request.item, from = %request.from, to = %request.to))]
    pub fn begin_move(&self, request: MoveRequest) -> Result<Option<PendingMove>, MoveError> {
        let mut inner = self.inner.lock();
        if inner.in_flight.contains(&request.item) {
            warn!("rejecting move; previous move still in flight");
            return Err(MoveError::InFlight(request.item));
        }

        let before = Arc::clone(&inner.state);
        let Some(next) = before.apply_move(&request)? else {
            debug!("drop on original position; nothing to do");
            return Ok(None);
        };

        let previous = before
            .item(&request.item)
            .cloned()
            .ok_or_else(|| MoveError::UnknownItem(request.item.clone()))?;
        let origin_index = before
            .locate(&request.item, &request.from)
            .map(|(_, index)| index)
            .unwrap_or(0);

        inner.publish(Arc::new(next));
        inner.in_flight.insert(request.item.clone());

        let pending = PendingMove {
            ticket: Uuid::new_v4(),
            persist: persist_args(&request.item, &request.to),
            request,
            snapshot: before,
            applied_generation: inner.generation,
            previous,
            origin_index,
        };
        debug!(ticket = %pending.ticket, generation = inner.generation, "applied optimistic move");
        Ok(Some(pending))
    }

    #[tracing::instrument(skip(self, pending), fields(ticket = %pending.ticket, item = %pending.request.item))]
    pub fn confirm(&self, pending: PendingMove) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&pending.request.item);
        debug!("move confirmed");
    }

    /// Undoes a move the backend refused. When nothing else has been
    /// published since, the pre-move snapshot comes back verbatim;
    /// otherwise only this item is put back.
    #[tracing::instrument(skip(self, pending), fields(ticket = %pending.ticket, item = %pending.request.item))]
    pub fn rollback(&self, pending: PendingMove) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&pending.request.item);

        let restored = if inner.generation == pending.applied_generation {
            debug!("restoring pre-move snapshot");
            pending.snapshot
        } else {
            debug!(
                applied = pending.applied_generation,
                current = inner.generation,
                "board changed since move; reverting item only"
            );
            Arc::new(inner.state.revert_item(
                &pending.previous,
                &pending.request.from,
                pending.origin_index,
            ))
        };
        inner.publish(restored);
    }

    /// Runs a move end to end: apply locally, wait for the backend, then
    /// keep it or undo it.
    #[tracing::instrument(skip(self, adapter), fields(item = %request.item, to = %request.to))]
    pub async fn commit_move<A>(&self, request: MoveRequest, adapter: &A) -> Result<MoveOutcome, MoveError>
    where
        A: SyncAdapter + ?Sized,
    {
        let Some(pending) = self.begin_move(request)? else {
            return Ok(MoveOutcome::Unchanged);
        };

        let result = adapter.persist_move(&pending.persist).await;
        self.finish_move(pending, result)
    }

    /// Second phase: keeps or undoes an applied move once the backend has
    /// answered.
    pub fn finish_move(
        &self,
        pending: PendingMove,
        result: Result<(), SyncError>,
    ) -> Result<MoveOutcome, MoveError> {
        match result {
            Ok(()) => {
                self.confirm(pending);
                Ok(MoveOutcome::Applied)
            }
            Err(source) => {
                warn!(error = %source, retryable = source.is_retryable(), "persist failed; rolling back");
                let item = pending.request.item.clone();
                let title = pending.previous.title.clone();
                self.rollback(pending);
                Err(MoveError::Persist { item, title, source })
            }
        }
    }

    pub async fn advance<A>(&self, key: &ItemKey, adapter: &A) -> Result<MoveOutcome, MoveError>
    where
        A: SyncAdapter + ?Sized,
    {
        let request = self.snapshot().advance_request(key)?;
        self.commit_move(request, adapter).await
    }
}
