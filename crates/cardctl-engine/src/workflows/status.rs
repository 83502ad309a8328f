//! Block and unblock workflows

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cardctl_types::{Result, TokenizedCardNumber};

use super::authorize;
use crate::collaborators::{CallContext, CardAction, CardDetails, CardStatus, Collaborators, Operation};

/// Outcome of a block or unblock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStatusResponse {
    pub card: TokenizedCardNumber,
    pub status: CardStatus,
    /// `None` when the status changed but the detail lookup failed
    pub details: Option<CardDetails>,
}

impl CardStatusResponse {
    /// Whether the detail lookup failed after the status change
    pub fn is_partial(&self) -> bool {
        self.details.is_none()
    }
}

pub(crate) async fn run(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    status: CardStatus,
) -> Result<CardStatusResponse> {
    let action = match status {
        CardStatus::Blocked => CardAction::BlockCard,
        CardStatus::Active => CardAction::UnblockCard,
    };
    authorize(deps, ctx, card, &[Operation::ManageCardStatus], action).await?;

    deps.card_status.update_status(ctx, card, status).await?;
    info!(card = %card, status = ?status, request_id = %ctx.request_id, "Card status updated");

    let details = match deps.card_status.card_details(ctx, card).await {
        Ok(details) => Some(details),
        Err(err) => {
            warn!(card = %card, error = %err, "Card details unavailable after status change");
            None
        }
    };

    Ok(CardStatusResponse {
        card: card.clone(),
        status,
        details,
    })
}
