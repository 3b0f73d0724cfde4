//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is used for serialization and event log filtering.
    fn event_type(&self) -> &'static str;

    /// Returns when the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Trait for aggregates backed by an append-only event log.
///
/// The aggregate is kept materialized for reads, but it must always be
/// reproducible by replaying its log:
/// - The first event of a stream creates the aggregate
/// - Every later event is applied in order (pure, deterministic)
/// - Each applied event advances the version by exactly one
pub trait Aggregate: Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the current version of the aggregate.
    ///
    /// Equals the number of events applied so far.
    fn version(&self) -> Version;

    /// Builds the aggregate from the event that opens its stream.
    ///
    /// Returns None if the event cannot open a stream.
    fn from_initial_event(event: &Self::Event) -> Option<Self>;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: &Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events<'a>(&mut self, events: impl IntoIterator<Item = &'a Self::Event>)
    where
        Self::Event: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }

    /// Rebuilds an aggregate from its full event log.
    ///
    /// Returns None for an empty log or one that does not start with an
    /// opening event.
    fn replay<'a>(events: impl IntoIterator<Item = &'a Self::Event>) -> Option<Self>
    where
        Self::Event: 'a,
    {
        let mut events = events.into_iter();
        let mut aggregate = Self::from_initial_event(events.next()?)?;
        aggregate.apply_events(events);
        Some(aggregate)
    }
}
