//! Listing controls across every card a persona is entitled to
//!
//! One unit of work runs per card on a `JoinSet`. Units wait on a shared
//! semaphore, so at most `max_concurrency` cards are checked and queried at
//! once, and each unit gets its own deadline once it holds a permit. Results
//! are gathered by this task alone. Dropping the future aborts every
//! outstanding unit with the `JoinSet`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use cardctl_rules::ControlsResponse;
use cardctl_types::{CardControlError, CardNumber, DownstreamStatus, Result, TokenizedCardNumber};

use crate::collaborators::{CallContext, CardAction, Collaborators, Operation};
use crate::config::{ListSettings, PartialFailurePolicy};
use crate::workflows::authorize;

/// Controls of every listed card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListControlsResponse {
    /// Views keyed by tokenized card number
    pub cards: BTreeMap<TokenizedCardNumber, ControlsResponse>,
    /// Entitled cards left out because their unit failed
    pub omitted: Vec<TokenizedCardNumber>,
}

impl ListControlsResponse {
    /// View of one card, if listed
    pub fn card(&self, card: &TokenizedCardNumber) -> Option<&ControlsResponse> {
        self.cards.get(card)
    }
}

enum UnitOutcome {
    Listed(ControlsResponse),
    /// The store query itself failed or found no record
    QueryFailed(CardControlError),
    /// A check before the query refused the card
    Rejected(CardControlError),
    TimedOut,
}

pub(crate) async fn run(
    deps: &Collaborators,
    settings: &ListSettings,
    policy: PartialFailurePolicy,
    ctx: &CallContext,
) -> Result<ListControlsResponse> {
    let cards: BTreeSet<TokenizedCardNumber> = deps
        .entitlements
        .list_entitled_cards(ctx)
        .await?
        .into_iter()
        .map(|entitled| entitled.card)
        .collect();
    if cards.is_empty() {
        debug!(request_id = %ctx.request_id, "Persona has no entitled cards");
        return Ok(ListControlsResponse::default());
    }

    let tokens: Vec<TokenizedCardNumber> = cards.into_iter().collect();
    let mut pans = deps.tokenizer.decode_many(&tokens).await?;

    let limiter = Arc::new(Semaphore::new(settings.max_concurrency));
    let deadline = settings.per_card_timeout();
    let mut units = JoinSet::new();

    for card in tokens {
        let deps = deps.clone();
        let ctx = ctx.clone();
        let limiter = Arc::clone(&limiter);
        let pan = pans.remove(&card);

        units.spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let err = CardControlError::downstream(
                        "list",
                        DownstreamStatus::Internal,
                        "concurrency limiter closed",
                    );
                    return (card, UnitOutcome::Rejected(err));
                }
            };
            let outcome = tokio::time::timeout(deadline, list_card(&deps, &ctx, &card, pan))
                .await
                .unwrap_or(UnitOutcome::TimedOut);
            (card, outcome)
        });
    }

    let mut response = ListControlsResponse::default();
    while let Some(joined) = units.join_next().await {
        let (card, outcome) = match joined {
            Ok(unit) => unit,
            Err(err) => {
                warn!(error = %err, request_id = %ctx.request_id, "List unit did not complete");
                if policy == PartialFailurePolicy::FailFast {
                    units.abort_all();
                    return Err(CardControlError::downstream(
                        "list",
                        DownstreamStatus::Internal,
                        format!("list unit did not complete: {err}"),
                    ));
                }
                continue;
            }
        };

        match (outcome, policy) {
            (UnitOutcome::Listed(view), _) => {
                response.cards.insert(card, view);
            }
            (UnitOutcome::QueryFailed(err), PartialFailurePolicy::Isolate) => {
                warn!(card = %card, error = %err, "Control query failed; listing card without controls");
                response.cards.insert(card, ControlsResponse::empty());
            }
            (UnitOutcome::TimedOut, PartialFailurePolicy::FailFast) => {
                units.abort_all();
                return Err(CardControlError::downstream(
                    "rules-store",
                    DownstreamStatus::DeadlineExceeded,
                    format!("listing card {card} exceeded {}ms", settings.per_card_timeout_ms),
                ));
            }
            (
                UnitOutcome::QueryFailed(err) | UnitOutcome::Rejected(err),
                PartialFailurePolicy::FailFast,
            ) => {
                units.abort_all();
                return Err(err);
            }
            (UnitOutcome::TimedOut, _) => {
                warn!(card = %card, timeout_ms = settings.per_card_timeout_ms, "Card listing timed out");
                response.omitted.push(card);
            }
            (UnitOutcome::QueryFailed(err) | UnitOutcome::Rejected(err), _) => {
                warn!(card = %card, error = %err, "Card omitted from listing");
                response.omitted.push(card);
            }
        }
    }

    response.omitted.sort();
    Ok(response)
}

async fn list_card(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    pan: Option<CardNumber>,
) -> UnitOutcome {
    if let Err(err) = authorize(
        deps,
        ctx,
        card,
        &[Operation::ViewControls],
        CardAction::QueryControls,
    )
    .await
    {
        return UnitOutcome::Rejected(err);
    }

    let Some(pan) = pan else {
        return UnitOutcome::Rejected(CardControlError::not_found(format!(
            "no card number for token {card}"
        )));
    };

    match deps.rules_store.query(&pan).await {
        Ok(Some(document)) => UnitOutcome::Listed(ControlsResponse::from(&document)),
        Ok(None) => UnitOutcome::QueryFailed(CardControlError::not_found("no control document found")),
        Err(err) => UnitOutcome::QueryFailed(err),
    }
}
