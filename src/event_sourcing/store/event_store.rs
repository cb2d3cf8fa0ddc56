use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};

// ============================================================================
// Event Store - Repository for Events
// ============================================================================
//
// Responsibilities:
// 1. Append events to a per-aggregate stream (append-only)
// 2. Load event history for aggregates
// 3. Ensure optimistic concurrency control
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {current}")]
    Conflict {
        aggregate_id: Uuid,
        expected: i64,
        current: i64,
    },

    #[error("Cannot append empty event list")]
    EmptyBatch,

    #[error("Event sequence {found} does not follow version {expected_version}")]
    SequenceGap { expected_version: i64, found: i64 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Persistence for event streams keyed by aggregate id.
#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// Append events atomically. Succeeds only when the stream is at
    /// `expected_version`; returns the new version.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, AppendError>;

    /// Load all events for an aggregate, in sequence order
    async fn load_events(&self, aggregate_id: Uuid) -> anyhow::Result<Vec<EventEnvelope<E>>>;

    /// Version of the stream; 0 for an aggregate that does not exist
    async fn current_version(&self, aggregate_id: Uuid) -> anyhow::Result<i64>;

    async fn aggregate_ids(&self) -> anyhow::Result<Vec<Uuid>>;
}

/// Load aggregate from its events. `None` when the stream is empty.
pub async fn load_aggregate<A, S>(store: &S, aggregate_id: Uuid) -> anyhow::Result<Option<A>>
where
    A: Aggregate,
    A::Event: DomainEvent,
    A::Error: std::fmt::Display,
    S: EventStore<A::Event> + ?Sized,
{
    let events = store.load_events(aggregate_id).await?;

    if events.is_empty() {
        return Ok(None);
    }

    A::load_from_events(&events).map(Some)
}

// ============================================================================
// In-Memory Event Store
// ============================================================================

pub struct InMemoryEventStore<E: DomainEvent> {
    streams: RwLock<HashMap<Uuid, Vec<EventEnvelope<E>>>>,
    aggregate_type_name: String,
    _phantom: PhantomData<E>,
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    pub fn new(aggregate_type_name: &str) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            aggregate_type_name: aggregate_type_name.to_string(),
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> EventStore<E> for InMemoryEventStore<E> {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, AppendError> {
        if events.is_empty() {
            return Err(AppendError::EmptyBatch);
        }

        // The write lock is held across the version check and the append,
        // which makes check-and-append a single step.
        let mut streams = self.streams.write().await;
        let stream = streams.entry(aggregate_id).or_default();

        let current_version = stream.last().map_or(0, |e| e.sequence_number);
        if current_version != expected_version {
            return Err(AppendError::Conflict {
                aggregate_id,
                expected: expected_version,
                current: current_version,
            });
        }

        let mut new_version = expected_version;
        for envelope in &events {
            if envelope.sequence_number != new_version + 1 {
                return Err(AppendError::SequenceGap {
                    expected_version: new_version,
                    found: envelope.sequence_number,
                });
            }
            new_version = envelope.sequence_number;
        }

        let event_count = events.len();
        stream.extend(events);

        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version = new_version,
            event_count = event_count,
            "Appended events to event store"
        );

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> anyhow::Result<Vec<EventEnvelope<E>>> {
        let streams = self.streams.read().await;
        let events = streams.get(&aggregate_id).cloned().unwrap_or_default();

        tracing::debug!("Loaded {} events for aggregate {}", events.len(), aggregate_id);
        Ok(events)
    }

    async fn current_version(&self, aggregate_id: Uuid) -> anyhow::Result<i64> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(0, |e| e.sequence_number))
    }

    async fn aggregate_ids(&self) -> anyhow::Result<Vec<Uuid>> {
        let streams = self.streams.read().await;
        Ok(streams
            .iter()
            .filter(|(_, stream)| !stream.is_empty())
            .map(|(id, _)| *id)
            .collect())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
