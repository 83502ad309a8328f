//! Idempotency checks between stored and desired documents

use cardctl_types::{ControlDocument, ControlRequest};

/// Whether `desired` carries exactly the controls already in `existing`
///
/// Order-sensitive; enrollment identity and `last_updated` are ignored.
pub fn unchanged(existing: &ControlDocument, desired: &ControlDocument) -> bool {
    existing.global_controls == desired.global_controls
        && existing.merchant_controls == desired.merchant_controls
        && existing.transaction_controls == desired.transaction_controls
}

/// The document the store will hold after accepting `request` as a create
///
/// A global entry replaces the whole global list. Merchant and transaction
/// entries replace the first stored entry of the same type, or are appended.
pub fn merge_request(existing: &ControlDocument, request: &ControlRequest) -> ControlDocument {
    let mut desired = existing.clone();

    if !request.global_controls.is_empty() {
        desired.global_controls = request.global_controls.clone();
    }

    for control in &request.merchant_controls {
        match desired
            .merchant_controls
            .iter_mut()
            .find(|c| c.control_type == control.control_type)
        {
            Some(slot) => *slot = control.clone(),
            None => desired.merchant_controls.push(control.clone()),
        }
    }

    for control in &request.transaction_controls {
        match desired
            .transaction_controls
            .iter_mut()
            .find(|c| c.control_type == control.control_type)
        {
            Some(slot) => *slot = control.clone(),
            None => desired.transaction_controls.push(control.clone()),
        }
    }

    desired
}
