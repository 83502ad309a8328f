//! Remove workflow
//!
//! Removals are applied to a private copy of the fetched document. The store
//! is only written when that copy differs from what it returned.

use tracing::{debug, info};

use cardctl_rules::{remove_control, unchanged, ControlsResponse};
use cardctl_types::{ControlRequest, ControlType, Result, TokenizedCardNumber};

use super::{open_card, validate_control_types};
use crate::collaborators::{CallContext, CardAction, Collaborators, Operation};

/// Resulting view plus the control types whose removal changed the document
pub(crate) struct Removal {
    pub response: ControlsResponse,
    pub removed: Vec<ControlType>,
}

pub(crate) async fn run(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    control_types: &[ControlType],
) -> Result<Removal> {
    validate_control_types(control_types)?;
    let (_, existing) = open_card(
        deps,
        ctx,
        card,
        &[Operation::ManageControls],
        CardAction::RemoveControls,
    )
    .await?;

    let Some(document_id) = existing.enrollment.document_id().cloned() else {
        debug!(card = %card, "Card not enrolled; nothing to remove");
        return Ok(Removal {
            response: ControlsResponse::empty(),
            removed: Vec::new(),
        });
    };

    let mut desired = existing.clone();
    let mut removed = Vec::new();
    for &control_type in control_types {
        if remove_control(&mut desired, control_type) {
            removed.push(control_type);
        }
    }

    if removed.is_empty() || unchanged(&existing, &desired) {
        debug!(card = %card, request_id = %ctx.request_id, "No control removed");
        return Ok(Removal {
            response: ControlsResponse::from(&existing),
            removed: Vec::new(),
        });
    }

    let stored = deps
        .rules_store
        .update(&document_id, &ControlRequest::replacing(&desired))
        .await?;
    info!(
        card = %card,
        document_id = %document_id,
        removed = ?removed,
        request_id = %ctx.request_id,
        "Controls removed"
    );
    Ok(Removal {
        response: ControlsResponse::from(&stored),
        removed,
    })
}
