//! Query workflow

use cardctl_rules::ControlsResponse;
use cardctl_types::{Result, TokenizedCardNumber};

use super::open_card;
use crate::collaborators::{CallContext, CardAction, Collaborators, Operation};

pub(crate) async fn run(
    deps: &Collaborators,
    ctx: &CallContext,
    card: &TokenizedCardNumber,
) -> Result<ControlsResponse> {
    let (_, document) = open_card(
        deps,
        ctx,
        card,
        &[Operation::ViewControls],
        CardAction::QueryControls,
    )
    .await?;
    Ok(ControlsResponse::from(&document))
}
