//! Domain events published after successful mutations

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};

use cardctl_types::{
    CardControlError, ControlType, DownstreamStatus, PersonaId, Result, TokenizedCardNumber,
};

/// Something a successful workflow changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Controls created or replaced on a card
    ControlsSet {
        card: TokenizedCardNumber,
        persona: PersonaId,
        control_types: Vec<ControlType>,
    },
    /// Controls removed from a card (or a removal cooldown requested)
    ControlsRemoved {
        card: TokenizedCardNumber,
        persona: PersonaId,
        control_types: Vec<ControlType>,
    },
    /// Card blocked
    CardBlocked {
        card: TokenizedCardNumber,
        persona: PersonaId,
    },
    /// Card unblocked
    CardUnblocked {
        card: TokenizedCardNumber,
        persona: PersonaId,
    },
}

impl DomainEvent {
    /// Event-bus name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ControlsSet { .. } => "card.controls.set",
            Self::ControlsRemoved { .. } => "card.controls.removed",
            Self::CardBlocked { .. } => "card.blocked",
            Self::CardUnblocked { .. } => "card.unblocked",
        }
    }

    /// Card the event concerns
    pub fn card(&self) -> &TokenizedCardNumber {
        match self {
            Self::ControlsSet { card, .. }
            | Self::ControlsRemoved { card, .. }
            | Self::CardBlocked { card, .. }
            | Self::CardUnblocked { card, .. } => card,
        }
    }
}

/// Event-bus publisher
#[async_trait::async_trait]
pub trait EventNotifier: Send + Sync {
    /// Publish an event; callers treat failure as non-fatal
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Event bus that keeps every published event in memory
#[derive(Default)]
pub struct InMemoryEventBus {
    published: RwLock<Vec<DomainEvent>>,
    fail_publishes: AtomicBool,
    latency_ms: AtomicU64,
    arrivals: Notify,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent publish take `latency` before it lands
    pub fn delay_publishes(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Events published so far, oldest first
    pub async fn published(&self) -> Vec<DomainEvent> {
        self.published.read().await.clone()
    }

    /// Names of events published so far
    pub async fn names(&self) -> Vec<&'static str> {
        self.published.read().await.iter().map(DomainEvent::name).collect()
    }

    /// Wait until at least `count` events landed or `within` elapsed, then
    /// return what was published
    pub async fn wait_for(&self, count: usize, within: Duration) -> Vec<DomainEvent> {
        let arrived = async {
            loop {
                let notified = self.arrivals.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.published.read().await.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(within, arrived).await;
        self.published().await
    }
}

#[async_trait::async_trait]
impl EventNotifier for InMemoryEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "event-bus",
                DownstreamStatus::Unavailable,
                format!("cannot publish {}", event.name()),
            ));
        }
        self.published.write().await.push(event.clone());
        self.arrivals.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked() -> DomainEvent {
        DomainEvent::CardBlocked {
            card: TokenizedCardNumber::parse("tok-1").unwrap(),
            persona: PersonaId::new("persona-1"),
        }
    }

    #[tokio::test]
    async fn bus_records_events_in_order() {
        let bus = InMemoryEventBus::new();
        bus.publish(&blocked()).await.unwrap();
        bus.publish(&DomainEvent::ControlsSet {
            card: TokenizedCardNumber::parse("tok-1").unwrap(),
            persona: PersonaId::new("persona-1"),
            control_types: vec![ControlType::Gambling],
        })
        .await
        .unwrap();

        assert_eq!(bus.names().await, vec!["card.blocked", "card.controls.set"]);
        assert_eq!(bus.published().await[0].card().as_str(), "tok-1");
    }

    #[tokio::test]
    async fn failing_bus_drops_events() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes(true);
        assert!(bus.publish(&blocked()).await.is_err());
        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn waiting_returns_once_enough_events_landed() {
        let bus = std::sync::Arc::new(InMemoryEventBus::new());
        bus.delay_publishes(Duration::from_millis(20));

        let publisher = std::sync::Arc::clone(&bus);
        let handle = tokio::spawn(async move { publisher.publish(&blocked()).await });

        let events = bus.wait_for(1, Duration::from_secs(2)).await;
        assert_eq!(events, vec![blocked()]);
        handle.await.unwrap().unwrap();

        // Gives up after the deadline with whatever arrived.
        let events = bus.wait_for(2, Duration::from_millis(10)).await;
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(blocked()).unwrap();
        assert_eq!(json["event"], "card_blocked");
        assert_eq!(json["card"], "tok-1");
    }
}
