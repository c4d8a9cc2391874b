//! Migration lifecycle events
//!
//! Events are published fire-and-forget. `EventBus` fans every event out to
//! one unbounded channel per subscriber, so publishing never waits on a slow
//! listener and each subscriber sees events in emission order.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::migrations::definitions::MigrationDirection;

/// Source tag attached to every migration event
pub const EVENT_SOURCE: &str = "migration";

pub const EVENT_MIGRATIONS_STARTED: &str = "migration.migrations_started";
pub const EVENT_MIGRATIONS_ENDED: &str = "migration.migrations_ended";
pub const EVENT_MIGRATION_STARTED: &str = "migration.migration_started";
pub const EVENT_MIGRATION_ENDED: &str = "migration.migration_ended";
pub const EVENT_MIGRATION_SKIPPED: &str = "migration.migration_skipped";
pub const EVENT_NO_PENDING_MIGRATIONS: &str = "migration.no_pending";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationEventKind {
    MigrationsStarted {
        direction: MigrationDirection,
    },
    MigrationsEnded {
        direction: MigrationDirection,
    },
    MigrationStarted {
        migration: String,
        method: MigrationDirection,
    },
    MigrationEnded {
        migration: String,
        method: MigrationDirection,
    },
    MigrationSkipped {
        migration: String,
    },
    NoPendingMigrations {
        direction: MigrationDirection,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationEvent {
    #[serde(flatten)]
    pub kind: MigrationEventKind,
    pub source: &'static str,
    pub occurred_at: DateTime<Utc>,
}

impl MigrationEvent {
    pub fn new(kind: MigrationEventKind) -> Self {
        Self {
            kind,
            source: EVENT_SOURCE,
            occurred_at: Utc::now(),
        }
    }

    pub fn migrations_started(direction: MigrationDirection) -> Self {
        Self::new(MigrationEventKind::MigrationsStarted { direction })
    }

    pub fn migrations_ended(direction: MigrationDirection) -> Self {
        Self::new(MigrationEventKind::MigrationsEnded { direction })
    }

    pub fn migration_started(migration: &str, method: MigrationDirection) -> Self {
        Self::new(MigrationEventKind::MigrationStarted {
            migration: migration.to_string(),
            method,
        })
    }

    pub fn migration_ended(migration: &str, method: MigrationDirection) -> Self {
        Self::new(MigrationEventKind::MigrationEnded {
            migration: migration.to_string(),
            method,
        })
    }

    pub fn migration_skipped(migration: &str) -> Self {
        Self::new(MigrationEventKind::MigrationSkipped {
            migration: migration.to_string(),
        })
    }

    pub fn no_pending(direction: MigrationDirection) -> Self {
        Self::new(MigrationEventKind::NoPendingMigrations { direction })
    }

    /// Dotted event name, e.g. `migration.migration_started`
    pub fn name(&self) -> &'static str {
        match self.kind {
            MigrationEventKind::MigrationsStarted { .. } => EVENT_MIGRATIONS_STARTED,
            MigrationEventKind::MigrationsEnded { .. } => EVENT_MIGRATIONS_ENDED,
            MigrationEventKind::MigrationStarted { .. } => EVENT_MIGRATION_STARTED,
            MigrationEventKind::MigrationEnded { .. } => EVENT_MIGRATION_ENDED,
            MigrationEventKind::MigrationSkipped { .. } => EVENT_MIGRATION_SKIPPED,
            MigrationEventKind::NoPendingMigrations { .. } => EVENT_NO_PENDING_MIGRATIONS,
        }
    }

    /// Migration name for per-migration events
    pub fn migration(&self) -> Option<&str> {
        match &self.kind {
            MigrationEventKind::MigrationStarted { migration, .. }
            | MigrationEventKind::MigrationEnded { migration, .. }
            | MigrationEventKind::MigrationSkipped { migration } => Some(migration),
            _ => None,
        }
    }

    /// Direction (or method) the event belongs to
    pub fn direction(&self) -> Option<MigrationDirection> {
        match &self.kind {
            MigrationEventKind::MigrationsStarted { direction }
            | MigrationEventKind::MigrationsEnded { direction }
            | MigrationEventKind::NoPendingMigrations { direction } => Some(*direction),
            MigrationEventKind::MigrationStarted { method, .. }
            | MigrationEventKind::MigrationEnded { method, .. } => Some(*method),
            MigrationEventKind::MigrationSkipped { .. } => None,
        }
    }
}

/// Sink for lifecycle events. Publishing must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: MigrationEvent);
}

/// Receives events dispatched by `EventBus::observe`
#[async_trait]
pub trait MigrationObserver: Send + Sync {
    async fn migrations_started(&self, _direction: MigrationDirection) {}

    async fn migrations_ended(&self, _direction: MigrationDirection) {}

    async fn migration_started(&self, _migration: &str, _method: MigrationDirection) {}

    async fn migration_ended(&self, _migration: &str, _method: MigrationDirection) {}

    async fn migration_skipped(&self, _migration: &str) {}

    async fn no_pending_migrations(&self, _direction: MigrationDirection) {}
}

/// In-process event bus with one channel per subscriber
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<MigrationEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        EventSubscription { receiver }
    }

    /// Dispatch every event to `observer` on a background task
    ///
    /// The task ends once the bus is dropped.
    pub fn observe<O>(&self, observer: O) -> JoinHandle<()>
    where
        O: MigrationObserver + 'static,
    {
        let mut subscription = self.subscribe();
        let observer = Arc::new(observer);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                dispatch(observer.as_ref(), event).await;
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: MigrationEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

async fn dispatch(observer: &dyn MigrationObserver, event: MigrationEvent) {
    match event.kind {
        MigrationEventKind::MigrationsStarted { direction } => {
            observer.migrations_started(direction).await
        }
        MigrationEventKind::MigrationsEnded { direction } => {
            observer.migrations_ended(direction).await
        }
        MigrationEventKind::MigrationStarted { migration, method } => {
            observer.migration_started(&migration, method).await
        }
        MigrationEventKind::MigrationEnded { migration, method } => {
            observer.migration_ended(&migration, method).await
        }
        MigrationEventKind::MigrationSkipped { migration } => {
            observer.migration_skipped(&migration).await
        }
        MigrationEventKind::NoPendingMigrations { direction } => {
            observer.no_pending_migrations(direction).await
        }
    }
}

/// Receiving side of an `EventBus` subscription
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<MigrationEvent>,
}

impl EventSubscription {
    /// Wait for the next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<MigrationEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MigrationEvent> {
        self.receiver.try_recv().ok()
    }

    /// Take every event already delivered
    pub fn drain(&mut self) -> Vec<MigrationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
