//! Set workflow
//!
//! The create payload is built before anything is written, so a gated-off
//! control type never leaves a freshly enrolled card behind.

use tracing::{debug, info};

use cardctl_rules::{build_create_request, merge_request, unchanged, ControlsResponse};
use cardctl_types::{CardControlError, ControlType, Enrollment, Result, TokenizedCardNumber};

use super::{open_card, validate_control_types};
use crate::collaborators::{CallContext, CardAction, Collaborators, Operation};

pub(crate) async fn run(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    control_types: &[ControlType],
) -> Result<ControlsResponse> {
    validate_control_types(control_types)?;
    let (pan, mut existing) = open_card(
        deps,
        ctx,
        card,
        &[Operation::ManageControls],
        CardAction::SetControls,
    )
    .await?;

    // Build before enrolling: a gated-off type must not register the card.
    let request = build_create_request(control_types, &ctx.persona, deps.feature_gate.as_ref())?;

    let document_id = match existing.enrollment.document_id().cloned() {
        Some(id) => id,
        None => {
            let id = deps.rules_store.register(&pan).await?;
            info!(card = %card, document_id = %id, request_id = %ctx.request_id, "Card enrolled");
            existing.enrollment = Enrollment::Enrolled(id.clone());
            id
        }
    };

    let desired = merge_request(&existing, &request);
    if unchanged(&existing, &desired) {
        debug!(card = %card, request_id = %ctx.request_id, "Controls already configured");
        return Err(CardControlError::AlreadyExists {
            detail: format!("card {card} already carries the requested controls"),
        });
    }

    let stored = deps.rules_store.create(&document_id, &request).await?;
    info!(
        card = %card,
        document_id = %document_id,
        control_types = ?control_types,
        request_id = %ctx.request_id,
        "Controls set"
    );
    Ok(ControlsResponse::from(&stored))
}
