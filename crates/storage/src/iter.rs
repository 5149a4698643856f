//! Forward-only async enumeration over a storage area.
//!
//! Each step is a fresh read-only transaction asking the engine for the
//! smallest key strictly after the last one yielded, so enumeration never
//! holds a transaction open between steps and sees writes made in between.

use crate::connection::ConnectionManager;
use crate::error::{Result, StorageError};
use crate::range::{next_key, next_key_value_pair, Cursor};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, Stream};
use kvarea_core::{Key, Value};
use kvarea_engine::TransactionMode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type StepFuture = Shared<BoxFuture<'static, Result<Option<IterItem>>>>;

/// What an iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterMode {
    Keys,
    Values,
    Entries,
}

/// One enumerated item.
#[derive(Debug, Clone, PartialEq)]
pub enum IterItem {
    Key(Key),
    Value(Value),
    Entry(Key, Value),
}

impl IterItem {
    pub fn key(&self) -> Option<&Key> {
        match self {
            IterItem::Key(key) | IterItem::Entry(key, _) => Some(key),
            IterItem::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            IterItem::Value(value) | IterItem::Entry(_, value) => Some(value),
            IterItem::Key(_) => None,
        }
    }
}

struct CursorSlot {
    position: Cursor,
    /// Bumped by `reset` and `finish` so that a step started earlier does not
    /// overwrite the new position.
    generation: u64,
}

/// An issued advancement, in call order.
struct QueuedStep {
    ticket: u64,
    future: StepFuture,
}

struct IterState {
    mode: IterMode,
    connection: ConnectionManager,
    cursor: Mutex<CursorSlot>,
    /// Unfinished advancements; only the front one may run.
    queue: Mutex<VecDeque<QueuedStep>>,
    next_ticket: AtomicU64,
}

/// Walks an area's key space one entry at a time in ascending key order.
///
/// Advancements are serialized in call order: every [`advance`] is queued
/// behind the ones issued before it, so several advancement futures created
/// before any is awaited still yield consecutive items. Awaiting a later
/// advancement drives the earlier ones first, one after another.
///
/// [`advance`]: SequentialRangeIterator::advance
pub struct SequentialRangeIterator {
    state: Arc<IterState>,
}

impl SequentialRangeIterator {
    pub fn new(mode: IterMode, connection: ConnectionManager) -> Self {
        Self {
            state: Arc::new(IterState {
                mode,
                connection,
                cursor: Mutex::new(CursorSlot {
                    position: Cursor::NotStarted,
                    generation: 0,
                }),
                queue: Mutex::new(VecDeque::new()),
                next_ticket: AtomicU64::new(0),
            }),
        }
    }

    pub fn mode(&self) -> IterMode {
        self.state.mode
    }

    /// Current cursor position.
    pub fn cursor(&self) -> Cursor {
        self.state.cursor.lock().position.clone()
    }

    /// Next item, or `None` once the key space is exhausted.
    ///
    /// The returned future does not borrow the iterator.
    pub fn advance(&self) -> impl Future<Output = Result<Option<IterItem>>> + Send + 'static {
        let state = Arc::clone(&self.state);

        // Tickets are taken under the queue lock so queue order is call order.
        let (ticket, step) = {
            let mut queue = state.queue.lock();
            let ticket = state.next_ticket.fetch_add(1, Ordering::Relaxed);
            let generation = state.cursor.lock().generation;
            let runner = Arc::clone(&state);
            let step: StepFuture = async move { runner.step(generation).await }
                .boxed()
                .shared();
            queue.push_back(QueuedStep {
                ticket,
                future: step.clone(),
            });
            (ticket, step)
        };

        async move {
            state.run_earlier(ticket).await;
            let result = step.await;
            state.dequeue(ticket);
            result
        }
    }

    /// Restart enumeration from the smallest key.
    pub fn reset(&self) {
        self.reposition(Cursor::NotStarted);
    }

    /// Stop enumeration; later advancements yield `None`.
    pub fn finish(&self) {
        self.reposition(Cursor::Exhausted);
    }

    /// All remaining items.
    pub async fn collect(&self) -> Result<Vec<IterItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.advance().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Remaining items as a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<IterItem>> + Send + 'static {
        stream::try_unfold(self, |iter| async move {
            let item = iter.advance().await?;
            Ok::<_, StorageError>(item.map(|item| (item, iter)))
        })
    }

    fn reposition(&self, position: Cursor) {
        let mut queue = self.state.queue.lock();
        queue.clear();
        let mut slot = self.state.cursor.lock();
        slot.generation += 1;
        slot.position = position;
    }
}

impl IterState {
    /// Drive every queued advancement issued before `ticket` to completion,
    /// oldest first.
    async fn run_earlier(&self, ticket: u64) {
        loop {
            let (earlier, future) = match self.queue.lock().front() {
                Some(front) if front.ticket < ticket => (front.ticket, front.future.clone()),
                _ => return,
            };
            // The outcome belongs to that step's caller.
            let _ = future.await;
            self.dequeue(earlier);
        }
    }

    fn dequeue(&self, ticket: u64) {
        let mut queue = self.queue.lock();
        if queue.front().is_some_and(|front| front.ticket == ticket) {
            queue.pop_front();
        }
    }

    /// One advancement issued under cursor `generation`.
    async fn step(&self, generation: u64) -> Result<Option<IterItem>> {
        let range = match self.cursor.lock().position.next_range() {
            Some(range) => range,
            None => return Ok(None),
        };

        let mode = self.mode;
        let found = self
            .connection
            .perform(TransactionMode::ReadOnly, |tx| async move {
                Ok::<_, StorageError>(match mode {
                    IterMode::Keys => next_key(&tx, &range)
                        .await?
                        .map(|key| (key.clone(), IterItem::Key(key))),
                    IterMode::Values => next_key_value_pair(&tx, &range)
                        .await?
                        .map(|(key, value)| (key, IterItem::Value(value))),
                    IterMode::Entries => next_key_value_pair(&tx, &range)
                        .await?
                        .map(|(key, value)| (key.clone(), IterItem::Entry(key, value))),
                })
            })
            .await?;

        let (key, item) = match found {
            Some((key, item)) => (Some(key), Some(item)),
            None => (None, None),
        };

        let mut slot = self.cursor.lock();
        if slot.generation == generation {
            slot.position = Cursor::advanced_to(key);
        }

        Ok(item)
    }
}
