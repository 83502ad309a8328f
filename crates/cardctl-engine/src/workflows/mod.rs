//! Single-card workflows
//!
//! Every workflow opens with the same short-circuiting sequence: entitlement,
//! eligibility, detokenization and document fetch. The engine wraps whatever
//! a workflow returns with its operation label.

use std::collections::HashSet;

use tracing::warn;

use cardctl_types::{
    AccountNumber, CardControlError, CardNumber, ControlDocument, ControlType, Result,
    TokenizedCardNumber,
};

use crate::collaborators::{CallContext, CardAction, Collaborators, Operation};

pub(crate) mod query;
pub(crate) mod remove;
pub(crate) mod set;
pub(crate) mod status;

/// Check the persona holds `operations` on the card and `action` is allowed
///
/// Any refusal or lookup failure is reported as `PermissionDenied`.
pub(crate) async fn authorize(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    operations: &[Operation],
    action: CardAction,
) -> Result<Vec<AccountNumber>> {
    let accounts = deps
        .entitlements
        .get_entitled_card(ctx, card, operations)
        .await
        .map_err(|err| deny("entitlement", card, err))?;
    if accounts.is_empty() {
        return Err(CardControlError::permission_denied(format!(
            "persona {} holds no account for card {card}",
            ctx.persona
        )));
    }

    deps.eligibility
        .can(ctx, action, card)
        .await
        .map_err(|err| deny("eligibility", card, err))?;

    Ok(accounts)
}

fn deny(check: &str, card: &TokenizedCardNumber, err: CardControlError) -> CardControlError {
    if matches!(err.root(), CardControlError::PermissionDenied { .. }) {
        return err;
    }
    CardControlError::permission_denied(format!("{check} check for card {card} failed: {err}"))
}

/// Authorize, detokenize and fetch the card's current document
pub(crate) async fn open_card(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
    operations: &[Operation],
    action: CardAction,
) -> Result<(CardNumber, ControlDocument)> {
    authorize(deps, ctx, card, operations, action).await?;
    let pan = deps.tokenizer.decode(card).await?;
    let document = fetch_document(deps, &pan).await?;
    Ok((pan, document))
}

/// Query the store, treating a missing record as `NotFound`
pub(crate) async fn fetch_document(deps: &Collaborators, pan: &CardNumber) -> Result<ControlDocument> {
    deps.rules_store
        .query(pan)
        .await?
        .ok_or_else(|| CardControlError::not_found("no control document found"))
}

/// Reject empty or duplicated control-type lists
pub(crate) fn validate_control_types(control_types: &[ControlType]) -> Result<()> {
    if control_types.is_empty() {
        return Err(CardControlError::validation(
            "control_types",
            "at least one control type is required",
        ));
    }
    let mut seen = HashSet::with_capacity(control_types.len());
    for control_type in control_types {
        if !seen.insert(control_type) {
            warn!(control_type = %control_type, "Duplicate control type requested");
            return Err(CardControlError::validation(
                "control_types",
                format!("{control_type} requested more than once"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardctl_types::ErrorKind;

    #[test]
    fn control_type_lists_must_be_non_empty_and_distinct() {
        assert!(validate_control_types(&[ControlType::Gambling, ControlType::Global]).is_ok());

        let err = validate_control_types(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);

        let err = validate_control_types(&[ControlType::Dining, ControlType::Dining]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(err.to_string().contains("MCT_DINING"));
    }
}
