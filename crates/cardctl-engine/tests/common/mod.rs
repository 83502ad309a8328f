//! Engine wired to in-memory collaborators

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cardctl_audit::{DomainEvent, InMemoryAuditLog, InMemoryEventBus};
use cardctl_engine::memory::{
    InMemoryCardStatus, InMemoryRulesStore, InMemoryTokenizer, StaticEligibility,
    StaticEntitlements,
};
use cardctl_engine::{CallContext, CardControlEngine, Collaborators, EngineConfig};
use cardctl_types::{AccountNumber, CardNumber, PersonaId, TokenizedCardNumber};

pub const PAN_VISA: &str = "4111111111111111";
pub const PAN_MASTERCARD: &str = "5555555555554444";
pub const PAN_DISCOVER: &str = "6011111111111117";

pub struct Harness {
    pub engine: CardControlEngine,
    pub store: Arc<InMemoryRulesStore>,
    pub entitlements: Arc<StaticEntitlements>,
    pub eligibility: Arc<StaticEligibility>,
    pub tokenizer: Arc<InMemoryTokenizer>,
    pub card_status: Arc<InMemoryCardStatus>,
    pub events: Arc<InMemoryEventBus>,
    pub audit: Arc<InMemoryAuditLog>,
    pub ctx: CallContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_toml(toml: &str) -> Self {
        Self::with_config(EngineConfig::from_toml_str(toml).expect("valid test config"))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryRulesStore::new());
        let entitlements = Arc::new(StaticEntitlements::new());
        let eligibility = Arc::new(StaticEligibility::new());
        let tokenizer = Arc::new(InMemoryTokenizer::new());
        let card_status = Arc::new(InMemoryCardStatus::new());
        let events = Arc::new(InMemoryEventBus::new());
        let audit = Arc::new(InMemoryAuditLog::new());

        let deps = Collaborators {
            entitlements: entitlements.clone(),
            eligibility: eligibility.clone(),
            tokenizer: tokenizer.clone(),
            rules_store: store.clone(),
            feature_gate: Arc::new(config.features.feature_gate()),
            card_status: card_status.clone(),
            notifier: events.clone(),
            audit: audit.clone(),
        };

        Self {
            engine: CardControlEngine::new(config, deps),
            store,
            entitlements,
            eligibility,
            tokenizer,
            card_status,
            events,
            audit,
            ctx: CallContext::new(PersonaId::new("persona-42")),
        }
    }

    /// Entitle the harness persona to a card and register its PAN with the tokenizer
    pub async fn add_card(&self, token: &str, pan: &str) -> TokenizedCardNumber {
        let card = TokenizedCardNumber::parse(token).expect("valid token");
        self.entitlements
            .grant(
                self.ctx.persona.clone(),
                card.clone(),
                AccountNumber::new(format!("acct-{token}")),
            )
            .await;
        self.tokenizer.insert(card.clone(), pan_of(pan)).await;
        card
    }
}

impl Harness {
    /// Events published in the background, once at least `count` landed
    pub async fn events_after(&self, count: usize) -> Vec<DomainEvent> {
        self.events.wait_for(count, Duration::from_secs(2)).await
    }

    /// Names of published events, once at least `count` landed
    pub async fn event_names(&self, count: usize) -> Vec<&'static str> {
        self.events_after(count)
            .await
            .iter()
            .map(DomainEvent::name)
            .collect()
    }

    /// Events after giving background publishes time to land
    pub async fn settled_events(&self) -> Vec<DomainEvent> {
        self.events.wait_for(usize::MAX, Duration::from_millis(50)).await
    }
}

pub fn pan_of(pan: &str) -> CardNumber {
    CardNumber::parse(pan).expect("valid test PAN")
}

/// Install a test subscriber; `RUST_LOG=debug` shows engine logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
