//! Finding and removing controls in a document
//!
//! Removal works on the caller's private copy of a document. Gambling blocks
//! are never deleted on the first request: the first removal only asks the
//! rules store to start a cooldown, and the entry goes away on a later
//! request once the store reports the cooldown as expired.

use cardctl_types::{
    Category, ControlDocument, ControlType, ImpulseDelayState, IMPULSE_DELAY_PERIOD,
};
use tracing::debug;

/// Index of the first enabled control of `control_type` in its category list
///
/// Global lookups ignore the type; a card has one global control.
pub fn find_enabled_control(document: &ControlDocument, control_type: ControlType) -> Option<usize> {
    match control_type.category() {
        Category::Global => document
            .global_controls
            .iter()
            .position(|c| c.control_enabled),
        Category::Merchant => document
            .merchant_controls
            .iter()
            .position(|c| c.control_type == control_type && c.control_enabled),
        Category::Transaction => document
            .transaction_controls
            .iter()
            .position(|c| c.control_type == control_type && c.control_enabled),
    }
}

/// Apply one removal request to `document`
///
/// Returns whether the document changed. A `false` result guarantees the
/// document is untouched.
pub fn remove_control(document: &mut ControlDocument, control_type: ControlType) -> bool {
    let Some(index) = find_enabled_control(document, control_type) else {
        debug!(control_type = %control_type, "no enabled control to remove");
        return false;
    };

    match control_type.category() {
        Category::Global => {
            document.global_controls.clear();
            true
        }
        Category::Transaction => {
            document.transaction_controls.remove(index);
            true
        }
        Category::Merchant if control_type.has_impulse_delay() => {
            remove_with_impulse_delay(document, index)
        }
        Category::Merchant => {
            document.merchant_controls.remove(index);
            true
        }
    }
}

fn remove_with_impulse_delay(document: &mut ControlDocument, index: usize) -> bool {
    let state = document.merchant_controls[index].impulse_delay_state();
    match state {
        ImpulseDelayState::NoDelay => {
            let control = &mut document.merchant_controls[index];
            control.impulse_delay_period = Some(IMPULSE_DELAY_PERIOD.to_string());
            debug!(control_type = %control.control_type, "impulse delay requested");
            true
        }
        ImpulseDelayState::DelayActive => {
            let control = &document.merchant_controls[index];
            debug!(
                control_type = %control.control_type,
                remaining = control.impulse_delay_remaining.as_deref().unwrap_or("pending"),
                "impulse delay still running"
            );
            false
        }
        ImpulseDelayState::DelayExpired => {
            document.merchant_controls.remove(index);
            true
        }
    }
}
