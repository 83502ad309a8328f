//! Card Control Engine - orchestration of card-control workflows
//!
//! `CardControlEngine` is the entry point callers use. It runs the Query,
//! Set, Remove, Block/Unblock and List workflows against the collaborator
//! contracts in [`collaborators`], then handles the side effects:
//!
//! - failures are wrapped with the workflow's operation label
//! - successful mutations publish a domain event in the background
//! - every outcome is handed to the audit sink, best-effort
//!
//! The engine keeps no state between calls. Each call fetches the card's
//! document, works on a private copy and lets it go.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use cardctl_audit::{AuditAction, AuditOutcome, AuditRecord, DomainEvent};
use cardctl_rules::ControlsResponse;
use cardctl_types::{ControlType, Result, TokenizedCardNumber};

pub mod collaborators;
pub mod config;
pub mod list;
pub mod memory;
mod workflows;

pub use collaborators::*;
pub use config::*;
pub use list::ListControlsResponse;
pub use workflows::status::CardStatusResponse;

/// Operation labels carried by workflow errors
pub mod labels {
    pub const QUERY: &str = "query control failed";
    pub const SET: &str = "set control failed";
    pub const REMOVE: &str = "remove control failed";
    pub const LIST: &str = "list controls failed";
    pub const BLOCK: &str = "block card failed";
    pub const UNBLOCK: &str = "unblock card failed";
}

/// Card-control engine
#[derive(Clone)]
pub struct CardControlEngine {
    config: Arc<EngineConfig>,
    deps: Collaborators,
}

impl CardControlEngine {
    /// Create an engine over the given collaborators
    pub fn new(config: EngineConfig, deps: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            deps,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Controls currently on a card
    pub async fn query_controls(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
    ) -> Result<ControlsResponse> {
        let result = workflows::query::run(&self.deps, ctx, card)
            .await
            .map_err(|err| err.labeled(labels::QUERY));
        self.audit(ctx, AuditAction::QueryControls, Some(card), &result, json!({}))
            .await;
        result
    }

    /// Create controls of the given types on a card, enrolling it if needed
    ///
    /// Fails with `AlreadyExists` when the card already carries exactly the
    /// controls the request would produce.
    pub async fn set_controls(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
        control_types: &[ControlType],
    ) -> Result<ControlsResponse> {
        let result = workflows::set::run(&self.deps, ctx, card, control_types)
            .await
            .map_err(|err| err.labeled(labels::SET));

        if result.is_ok() {
            self.notify(DomainEvent::ControlsSet {
                card: card.clone(),
                persona: ctx.persona.clone(),
                control_types: control_types.to_vec(),
            });
        }
        self.audit(
            ctx,
            AuditAction::SetControls,
            Some(card),
            &result,
            json!({ "control_types": control_types }),
        )
        .await;
        result
    }

    /// Remove controls of the given types from a card
    ///
    /// Removing the gambling control the first time only starts its
    /// cooldown; it is deleted by a removal after the cooldown ran out.
    /// Returns the current view without writing when nothing changes.
    pub async fn remove_controls(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
        control_types: &[ControlType],
    ) -> Result<ControlsResponse> {
        let result = workflows::remove::run(&self.deps, ctx, card, control_types)
            .await
            .map_err(|err| err.labeled(labels::REMOVE));

        let result = match result {
            Ok(removal) => {
                if !removal.removed.is_empty() {
                    self.notify(DomainEvent::ControlsRemoved {
                        card: card.clone(),
                        persona: ctx.persona.clone(),
                        control_types: removal.removed,
                    });
                }
                Ok(removal.response)
            }
            Err(err) => Err(err),
        };
        self.audit(
            ctx,
            AuditAction::RemoveControls,
            Some(card),
            &result,
            json!({ "control_types": control_types }),
        )
        .await;
        result
    }

    /// Block a card
    pub async fn block_card(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
    ) -> Result<CardStatusResponse> {
        let result = workflows::status::run(&self.deps, ctx, card, CardStatus::Blocked)
            .await
            .map_err(|err| err.labeled(labels::BLOCK));
        if result.is_ok() {
            self.notify(DomainEvent::CardBlocked {
                card: card.clone(),
                persona: ctx.persona.clone(),
            });
        }
        self.audit(ctx, AuditAction::BlockCard, Some(card), &result, json!({}))
            .await;
        result
    }

    /// Unblock a card
    pub async fn unblock_card(
        &self,
        ctx: &CallContext,
        card: &TokenizedCardNumber,
    ) -> Result<CardStatusResponse> {
        let result = workflows::status::run(&self.deps, ctx, card, CardStatus::Active)
            .await
            .map_err(|err| err.labeled(labels::UNBLOCK));
        if result.is_ok() {
            self.notify(DomainEvent::CardUnblocked {
                card: card.clone(),
                persona: ctx.persona.clone(),
            });
        }
        self.audit(ctx, AuditAction::UnblockCard, Some(card), &result, json!({}))
            .await;
        result
    }

    /// Controls of every card the persona is entitled to, under the
    /// configured partial-failure policy
    pub async fn list_controls(&self, ctx: &CallContext) -> Result<ListControlsResponse> {
        self.list_controls_with_policy(ctx, self.config.list.failure_policy)
            .await
    }

    /// Controls of every card the persona is entitled to
    pub async fn list_controls_with_policy(
        &self,
        ctx: &CallContext,
        policy: PartialFailurePolicy,
    ) -> Result<ListControlsResponse> {
        let result = list::run(&self.deps, &self.config.list, policy, ctx)
            .await
            .map_err(|err| err.labeled(labels::LIST));
        self.audit(
            ctx,
            AuditAction::ListControls,
            None,
            &result,
            json!({ "failure_policy": policy }),
        )
        .await;
        result
    }

    /// Publish `event` on a detached task; the caller never waits for the bus
    fn notify(&self, event: DomainEvent) {
        if !self.config.notifications.enabled {
            return;
        }
        let notifier = Arc::clone(&self.deps.notifier);
        let deadline = self.config.notifications.timeout();
        let timeout_ms = self.config.notifications.timeout_ms;

        tokio::spawn(async move {
            match tokio::time::timeout(deadline, notifier.publish(&event)).await {
                Ok(Ok(())) => debug!(event = event.name(), card = %event.card(), "Event published"),
                Ok(Err(err)) => {
                    warn!(event = event.name(), card = %event.card(), error = %err, "Event publish failed")
                }
                Err(_) => warn!(
                    event = event.name(),
                    card = %event.card(),
                    timeout_ms,
                    "Event publish timed out"
                ),
            }
        });
    }

    async fn audit<T: Serialize>(
        &self,
        ctx: &CallContext,
        action: AuditAction,
        card: Option<&TokenizedCardNumber>,
        result: &Result<T>,
        extra: Value,
    ) {
        if !self.config.audit.enabled {
            return;
        }

        let response = match result {
            Ok(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };
        let mut service_data = json!({
            "request_id": ctx.request_id.to_string(),
            "service": self.config.audit.service_name,
        });
        if let (Value::Object(data), Value::Object(extra)) = (&mut service_data, extra) {
            data.extend(extra);
        }

        let record = AuditRecord {
            action,
            actor: ctx.persona.clone(),
            card: card.cloned(),
            outcome: AuditOutcome::of(result),
            response,
            service_data,
        };
        if let Err(err) = self.deps.audit.publish(record).await {
            warn!(action = ?action, request_id = %ctx.request_id, error = %err, "Audit publish failed");
        }
    }
}
