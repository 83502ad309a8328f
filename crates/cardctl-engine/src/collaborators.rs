//! Contracts of the services the engine depends on
//!
//! Transport details stay behind these traits. Implementations report their
//! own failures as `CardControlError::Downstream` with a status
//! classification, or as `PermissionDenied` when they refuse the caller.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cardctl_audit::{AuditSink, EventNotifier};
use cardctl_rules::FeatureGate;
use cardctl_types::{
    AccountNumber, CardNumber, ControlDocument, ControlRequest, DocumentId, PersonaId, Result,
    TokenizedCardNumber,
};

/// Request-scoped identity passed to every collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Persona the request acts for
    pub persona: PersonaId,
    /// Correlates log lines and audit records of one request
    pub request_id: Uuid,
}

impl CallContext {
    pub fn new(persona: PersonaId) -> Self {
        Self {
            persona,
            request_id: Uuid::new_v4(),
        }
    }
}

/// Entitlement a persona must hold on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ViewControls,
    ManageControls,
    ManageCardStatus,
}

/// Action checked against the card's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    QueryControls,
    SetControls,
    RemoveControls,
    BlockCard,
    UnblockCard,
}

/// A card a persona is entitled to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitledCard {
    pub card: TokenizedCardNumber,
    pub account: AccountNumber,
}

/// Card status as managed by the card platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Blocked,
}

/// Display details of a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub card: TokenizedCardNumber,
    pub status: CardStatus,
    pub last_four: String,
    pub product_name: String,
}

/// Which accounts and cards a persona owns
#[async_trait::async_trait]
pub trait EntitlementResolver: Send + Sync {
    /// Accounts through which the persona holds every one of `operations` on `card`
    async fn get_entitled_card(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
        operations: &[Operation],
    ) -> Result<Vec<AccountNumber>>;

    /// Every card the persona is entitled to
    async fn list_entitled_cards(&self, ctx: &CallContext) -> Result<Vec<EntitledCard>>;
}

/// Whether an action is currently allowed on a card
#[async_trait::async_trait]
pub trait EligibilityResolver: Send + Sync {
    async fn can(&self, ctx: &CallContext, action: CardAction, card: &TokenizedCardNumber)
        -> Result<()>;
}

/// Tokenization service
#[async_trait::async_trait]
pub trait Tokenizer: Send + Sync {
    /// Detokenize one card
    async fn decode(&self, card: &TokenizedCardNumber) -> Result<CardNumber>;

    /// Detokenize many cards in one call; unknown tokens are absent from the map
    async fn decode_many(
        &self,
        cards: &[TokenizedCardNumber],
    ) -> Result<HashMap<TokenizedCardNumber, CardNumber>>;
}

/// Downstream store of control documents, keyed by PAN
#[async_trait::async_trait]
pub trait RulesStore: Send + Sync {
    /// Enroll a card, returning its document id
    async fn register(&self, pan: &CardNumber) -> Result<DocumentId>;

    /// Current document; `None` when the store has no record at all
    async fn query(&self, pan: &CardNumber) -> Result<Option<ControlDocument>>;

    /// Add the request's controls to the document
    async fn create(&self, document_id: &DocumentId, request: &ControlRequest)
        -> Result<ControlDocument>;

    /// Replace the document's controls with the request's
    async fn update(&self, document_id: &DocumentId, request: &ControlRequest)
        -> Result<ControlDocument>;
}

/// Card platform used by block/unblock
#[async_trait::async_trait]
pub trait CardStatusService: Send + Sync {
    async fn update_status(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
        status: CardStatus,
    ) -> Result<()>;

    async fn card_details(&self, ctx: &CallContext, card: &TokenizedCardNumber)
        -> Result<CardDetails>;
}

/// Every collaborator the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub entitlements: Arc<dyn EntitlementResolver>,
    pub eligibility: Arc<dyn EligibilityResolver>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub rules_store: Arc<dyn RulesStore>,
    pub feature_gate: Arc<dyn FeatureGate>,
    pub card_status: Arc<dyn CardStatusService>,
    pub notifier: Arc<dyn EventNotifier>,
    pub audit: Arc<dyn AuditSink>,
}
