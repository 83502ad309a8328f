//! In-memory collaborators
//!
//! Used by tests and local wiring. Each keeps its state behind a tokio
//! `RwLock` and offers knobs to inject the failures real services produce.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use cardctl_rules::merge_request;
use cardctl_types::{
    AccountNumber, CardControlError, CardNumber, ControlDocument, ControlRequest, DocumentId,
    DownstreamStatus, Enrollment, PersonaId, Result, TokenizedCardNumber, IMPULSE_DELAY_EXPIRED,
};

use crate::collaborators::{
    CallContext, CardAction, CardDetails, CardStatus, CardStatusService, EligibilityResolver,
    EntitledCard, EntitlementResolver, Operation, RulesStore, Tokenizer,
};

const RULES_STORE: &str = "rules-store";

// =============================================================================
// Rules store
// =============================================================================

/// Rules store holding documents in memory
///
/// Cards it has never seen query as not enrolled. Whenever a write leaves a
/// merchant control with a requested impulse-delay period and no start, the
/// store starts the cooldown clock, as the real store does.
#[derive(Default)]
pub struct InMemoryRulesStore {
    documents: RwLock<HashMap<CardNumber, ControlDocument>>,
    missing: RwLock<HashSet<CardNumber>>,
    query_failures: RwLock<HashMap<CardNumber, DownstreamStatus>>,
    query_latency: RwLock<HashMap<CardNumber, Duration>>,
    fail_writes: AtomicBool,
    next_id: AtomicU64,
    register_calls: AtomicUsize,
    query_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl InMemoryRulesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document for a card
    pub async fn insert(&self, pan: CardNumber, document: ControlDocument) {
        self.documents.write().await.insert(pan, document);
    }

    /// Stored document for a card
    pub async fn document(&self, pan: &CardNumber) -> Option<ControlDocument> {
        self.documents.read().await.get(pan).cloned()
    }

    /// Make queries for a card return no document at all
    pub async fn mark_missing(&self, pan: CardNumber) {
        self.missing.write().await.insert(pan);
    }

    /// Make queries for a card fail
    pub async fn fail_queries_for(&self, pan: CardNumber, status: DownstreamStatus) {
        self.query_failures.write().await.insert(pan, status);
    }

    /// Make queries for a card take `latency` before answering
    pub async fn delay_queries_for(&self, pan: CardNumber, latency: Duration) {
        self.query_latency.write().await.insert(pan, latency);
    }

    /// Make every create and update fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Run every started impulse-delay clock on the card to zero
    pub async fn expire_impulse_delays(&self, pan: &CardNumber) {
        if let Some(document) = self.documents.write().await.get_mut(pan) {
            for control in &mut document.merchant_controls {
                if control.impulse_delay_remaining.is_some() {
                    control.impulse_delay_remaining = Some(IMPULSE_DELAY_EXPIRED.to_string());
                }
            }
        }
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                RULES_STORE,
                DownstreamStatus::Unavailable,
                "rules store rejected the write",
            ));
        }
        Ok(())
    }

    async fn write_document(
        &self,
        document_id: &DocumentId,
        apply: impl FnOnce(&ControlDocument) -> ControlDocument,
    ) -> Result<ControlDocument> {
        let mut documents = self.documents.write().await;
        let document = documents
            .values_mut()
            .find(|doc| doc.enrollment.document_id() == Some(document_id))
            .ok_or_else(|| {
                CardControlError::downstream(
                    RULES_STORE,
                    DownstreamStatus::NotFound,
                    format!("document {document_id} does not exist"),
                )
            })?;

        let mut updated = apply(&*document);
        updated.enrollment = document.enrollment.clone();
        updated.last_updated = Utc::now().to_rfc3339();
        start_impulse_delay_clocks(&mut updated);
        *document = updated.clone();
        Ok(updated)
    }
}

fn start_impulse_delay_clocks(document: &mut ControlDocument) {
    let now = Utc::now();
    for control in &mut document.merchant_controls {
        let Some(period) = control.impulse_delay_period.clone() else {
            continue;
        };
        if control.impulse_delay_start.is_some() {
            continue;
        }
        let hours = period
            .split(':')
            .next()
            .and_then(|h| h.parse::<i64>().ok())
            .unwrap_or(48);
        control.impulse_delay_start = Some(now.to_rfc3339());
        control.impulse_delay_end = Some((now + chrono::Duration::hours(hours)).to_rfc3339());
        control.impulse_delay_remaining = Some(format!("{period}:00"));
    }
}

#[async_trait::async_trait]
impl RulesStore for InMemoryRulesStore {
    async fn register(&self, pan: &CardNumber) -> Result<DocumentId> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.write().await;
        if let Some(Enrollment::Enrolled(id)) = documents.get(pan).map(|d| &d.enrollment) {
            return Ok(id.clone());
        }
        let id = DocumentId::new(format!(
            "ctc-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let mut document = ControlDocument::enrolled(id.clone());
        document.last_updated = Utc::now().to_rfc3339();
        documents.insert(pan.clone(), document);
        Ok(id)
    }

    async fn query(&self, pan: &CardNumber) -> Result<Option<ControlDocument>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.query_latency.read().await.get(pan).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(status) = self.query_failures.read().await.get(pan).copied() {
            return Err(CardControlError::downstream(
                RULES_STORE,
                status,
                format!("query for card {pan} failed"),
            ));
        }
        if self.missing.read().await.contains(pan) {
            return Ok(None);
        }
        Ok(Some(
            self.documents
                .read()
                .await
                .get(pan)
                .cloned()
                .unwrap_or_else(ControlDocument::not_enrolled),
        ))
    }

    async fn create(
        &self,
        document_id: &DocumentId,
        request: &ControlRequest,
    ) -> Result<ControlDocument> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.write_document(document_id, |doc| merge_request(doc, request))
            .await
    }

    async fn update(
        &self,
        document_id: &DocumentId,
        request: &ControlRequest,
    ) -> Result<ControlDocument> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.write_document(document_id, |doc| ControlDocument {
            global_controls: request.global_controls.clone(),
            merchant_controls: request.merchant_controls.clone(),
            transaction_controls: request.transaction_controls.clone(),
            ..doc.clone()
        })
        .await
    }
}

// =============================================================================
// Entitlements & eligibility
// =============================================================================

/// Entitlements from a fixed persona → cards table
#[derive(Default)]
pub struct StaticEntitlements {
    cards: RwLock<HashMap<PersonaId, Vec<EntitledCard>>>,
    failing_cards: RwLock<HashSet<TokenizedCardNumber>>,
    fail_listing: AtomicBool,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entitle `persona` to `card` through `account`
    pub async fn grant(&self, persona: PersonaId, card: TokenizedCardNumber, account: AccountNumber) {
        self.cards
            .write()
            .await
            .entry(persona)
            .or_default()
            .push(EntitledCard { card, account });
    }

    /// Make single-card lookups for `card` fail as unavailable
    pub async fn fail_lookups_for(&self, card: TokenizedCardNumber) {
        self.failing_cards.write().await.insert(card);
    }

    /// Make `list_entitled_cards` fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl EntitlementResolver for StaticEntitlements {
    async fn get_entitled_card(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
        _operations: &[Operation],
    ) -> Result<Vec<AccountNumber>> {
        if self.failing_cards.read().await.contains(card) {
            return Err(CardControlError::downstream(
                "entitlements",
                DownstreamStatus::Unavailable,
                format!("entitlement lookup for {card} failed"),
            ));
        }
        let accounts: Vec<AccountNumber> = self
            .cards
            .read()
            .await
            .get(&ctx.persona)
            .into_iter()
            .flatten()
            .filter(|entitled| &entitled.card == card)
            .map(|entitled| entitled.account.clone())
            .collect();
        if accounts.is_empty() {
            return Err(CardControlError::permission_denied(format!(
                "persona {} is not entitled to card {card}",
                ctx.persona
            )));
        }
        Ok(accounts)
    }

    async fn list_entitled_cards(&self, ctx: &CallContext) -> Result<Vec<EntitledCard>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "entitlements",
                DownstreamStatus::Unavailable,
                "entitlement listing failed",
            ));
        }
        Ok(self
            .cards
            .read()
            .await
            .get(&ctx.persona)
            .cloned()
            .unwrap_or_default())
    }
}

/// Eligibility that allows everything not explicitly denied
#[derive(Default)]
pub struct StaticEligibility {
    denied: RwLock<HashSet<(TokenizedCardNumber, CardAction)>>,
    denied_cards: RwLock<HashSet<TokenizedCardNumber>>,
}

impl StaticEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny one action on a card
    pub async fn deny(&self, card: TokenizedCardNumber, action: CardAction) {
        self.denied.write().await.insert((card, action));
    }

    /// Deny every action on a card
    pub async fn deny_all(&self, card: TokenizedCardNumber) {
        self.denied_cards.write().await.insert(card);
    }
}

#[async_trait::async_trait]
impl EligibilityResolver for StaticEligibility {
    async fn can(
        &self,
        _ctx: &CallContext,
        action: CardAction,
        card: &TokenizedCardNumber,
    ) -> Result<()> {
        let denied = self.denied_cards.read().await.contains(card)
            || self.denied.read().await.contains(&(card.clone(), action));
        if denied {
            return Err(CardControlError::permission_denied(format!(
                "card {card} is not eligible for {action:?}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

/// Token vault held in memory
#[derive(Default)]
pub struct InMemoryTokenizer {
    vault: RwLock<HashMap<TokenizedCardNumber, CardNumber>>,
    fail_batches: AtomicBool,
}

impl InMemoryTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token → PAN mapping
    pub async fn insert(&self, card: TokenizedCardNumber, pan: CardNumber) {
        self.vault.write().await.insert(card, pan);
    }

    /// Make `decode_many` fail
    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Tokenizer for InMemoryTokenizer {
    async fn decode(&self, card: &TokenizedCardNumber) -> Result<CardNumber> {
        self.vault.read().await.get(card).cloned().ok_or_else(|| {
            CardControlError::downstream(
                "tokenizer",
                DownstreamStatus::NotFound,
                format!("unknown token {card}"),
            )
        })
    }

    async fn decode_many(
        &self,
        cards: &[TokenizedCardNumber],
    ) -> Result<HashMap<TokenizedCardNumber, CardNumber>> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "tokenizer",
                DownstreamStatus::Unavailable,
                "batch detokenization failed",
            ));
        }
        let vault = self.vault.read().await;
        Ok(cards
            .iter()
            .filter_map(|card| vault.get(card).map(|pan| (card.clone(), pan.clone())))
            .collect())
    }
}

// =============================================================================
// Card status
// =============================================================================

/// Card platform held in memory; unknown cards start active
#[derive(Default)]
pub struct InMemoryCardStatus {
    statuses: RwLock<HashMap<TokenizedCardNumber, CardStatus>>,
    fail_updates: AtomicBool,
    fail_details: AtomicBool,
}

impl InMemoryCardStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of a card
    pub async fn status(&self, card: &TokenizedCardNumber) -> CardStatus {
        self.statuses
            .read()
            .await
            .get(card)
            .copied()
            .unwrap_or(CardStatus::Active)
    }

    /// Make status updates fail
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make detail lookups fail
    pub fn fail_details(&self, fail: bool) {
        self.fail_details.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CardStatusService for InMemoryCardStatus {
    async fn update_status(
        &self,
        _ctx: &CallContext,
        card: &TokenizedCardNumber,
        status: CardStatus,
    ) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "card-platform",
                DownstreamStatus::Internal,
                format!("status update for {card} failed"),
            ));
        }
        self.statuses.write().await.insert(card.clone(), status);
        Ok(())
    }

    async fn card_details(
        &self,
        _ctx: &CallContext,
        card: &TokenizedCardNumber,
    ) -> Result<CardDetails> {
        if self.fail_details.load(Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "card-platform",
                DownstreamStatus::Unavailable,
                format!("details for {card} unavailable"),
            ));
        }
        let token = card.as_str();
        Ok(CardDetails {
            card: card.clone(),
            status: self.status(card).await,
            last_four: token[token.len().saturating_sub(4)..].to_string(),
            product_name: "Debit Card".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardctl_types::{ControlType, MerchantControl};

    fn pan() -> CardNumber {
        CardNumber::parse("4111111111111111").unwrap()
    }

    #[tokio::test]
    async fn unknown_card_queries_as_not_enrolled() {
        let store = InMemoryRulesStore::new();
        let doc = store.query(&pan()).await.unwrap().unwrap();
        assert_eq!(doc.enrollment, Enrollment::NotEnrolled);
        assert_eq!(store.query_calls(), 1);
    }

    #[tokio::test]
    async fn register_is_idempotent_per_card() {
        let store = InMemoryRulesStore::new();
        let first = store.register(&pan()).await.unwrap();
        let second = store.register(&pan()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.register_calls(), 2);
    }

    #[tokio::test]
    async fn update_starts_the_impulse_delay_clock() {
        let store = InMemoryRulesStore::new();
        let id = store.register(&pan()).await.unwrap();
        let mut gambling = MerchantControl::new(ControlType::Gambling);
        gambling.impulse_delay_period = Some("48:00".to_string());
        let request = ControlRequest {
            merchant_controls: vec![gambling],
            ..ControlRequest::default()
        };

        let doc = store.update(&id, &request).await.unwrap();
        let control = &doc.merchant_controls[0];
        assert!(control.impulse_delay_start.is_some());
        assert!(control.impulse_delay_end.is_some());
        assert_eq!(control.impulse_delay_remaining.as_deref(), Some("48:00:00"));

        store.expire_impulse_delays(&pan()).await;
        let doc = store.document(&pan()).await.unwrap();
        assert_eq!(
            doc.merchant_controls[0].impulse_delay_remaining.as_deref(),
            Some("00:00:00")
        );
    }

    #[tokio::test]
    async fn writes_to_unknown_document_fail() {
        let store = InMemoryRulesStore::new();
        let err = store
            .create(&DocumentId::new("ctc-404"), &ControlRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.downstream_status(), Some(DownstreamStatus::NotFound));
    }

    #[tokio::test]
    async fn batch_decode_skips_unknown_tokens() {
        let tokenizer = InMemoryTokenizer::new();
        let known = TokenizedCardNumber::parse("tok-1").unwrap();
        let unknown = TokenizedCardNumber::parse("tok-2").unwrap();
        tokenizer.insert(known.clone(), pan()).await;

        let decoded = tokenizer.decode_many(&[known.clone(), unknown]).await.unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[&known], pan());
    }
}
