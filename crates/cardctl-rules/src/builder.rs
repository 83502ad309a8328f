//! Building create requests from requested control types

use cardctl_types::{
    CardControlError, Category, ControlRequest, ControlType, GlobalControl, MerchantControl,
    PersonaId, Result, TransactionControl,
};
use rust_decimal::Decimal;

use crate::FeatureGate;

/// Build the create payload for `requested`, in caller order
///
/// The first type the gate has switched off aborts the build with
/// `FeatureDisabled`; no partial payload is ever returned.
pub fn build_create_request(
    requested: &[ControlType],
    persona: &PersonaId,
    gate: &dyn FeatureGate,
) -> Result<ControlRequest> {
    let mut request = ControlRequest::default();

    for &control_type in requested {
        if !gate.is_enabled(control_type.as_str()) {
            return Err(CardControlError::FeatureDisabled {
                control_type: control_type.as_str().to_string(),
            });
        }

        match control_type.category() {
            Category::Global => request.global_controls.push(default_global(persona)),
            Category::Merchant => request
                .merchant_controls
                .push(default_merchant(control_type, persona)),
            Category::Transaction => request
                .transaction_controls
                .push(default_transaction(control_type, persona)),
        }
    }

    Ok(request)
}

fn default_global(persona: &PersonaId) -> GlobalControl {
    GlobalControl {
        control_enabled: true,
        user_identifier: Some(persona.clone()),
        alert_threshold: None,
        decline_threshold: None,
        should_decline_all: true,
        should_alert_on_decline: true,
        decline_all_non_tokenized_transactions: true,
    }
}

// Thresholds are placeholders; decline-all makes them inert.
fn default_merchant(control_type: ControlType, persona: &PersonaId) -> MerchantControl {
    MerchantControl {
        user_identifier: Some(persona.clone()),
        alert_threshold: Some(Decimal::ZERO),
        decline_threshold: Some(Decimal::ZERO),
        should_decline_all: true,
        should_alert_on_decline: true,
        ..MerchantControl::new(control_type)
    }
}

fn default_transaction(control_type: ControlType, persona: &PersonaId) -> TransactionControl {
    TransactionControl {
        user_identifier: Some(persona.clone()),
        alert_threshold: Some(Decimal::ZERO),
        decline_threshold: Some(Decimal::ZERO),
        should_decline_all: true,
        should_alert_on_decline: true,
        ..TransactionControl::new(control_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticFeatureGate;

    fn persona() -> PersonaId {
        PersonaId::new("persona-1")
    }

    #[test]
    fn builds_entries_per_category_in_order() {
        let gate = StaticFeatureGate::all_enabled();
        let request = build_create_request(
            &[
                ControlType::Gambling,
                ControlType::Global,
                ControlType::ECommerce,
                ControlType::Alcohol,
            ],
            &persona(),
            &gate,
        )
        .unwrap();

        assert_eq!(request.global_controls.len(), 1);
        assert!(request.global_controls[0].decline_all_non_tokenized_transactions);
        let merchant: Vec<_> = request
            .merchant_controls
            .iter()
            .map(|c| c.control_type)
            .collect();
        assert_eq!(merchant, vec![ControlType::Gambling, ControlType::Alcohol]);
        assert_eq!(request.transaction_controls[0].control_type, ControlType::ECommerce);
        assert_eq!(request.transaction_controls[0].decline_threshold, Some(Decimal::ZERO));
        assert!(request
            .merchant_controls
            .iter()
            .all(|c| c.user_identifier.as_ref() == Some(&persona()) && c.should_decline_all));
    }

    #[test]
    fn first_disabled_type_aborts_the_build() {
        let gate = StaticFeatureGate::with_disabled(["GCT_GLOBAL"]);
        let err = build_create_request(
            &[ControlType::Global, ControlType::Gambling],
            &persona(),
            &gate,
        )
        .unwrap_err();

        match err {
            CardControlError::FeatureDisabled { control_type } => {
                assert_eq!(control_type, "GCT_GLOBAL")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn disabled_type_later_in_list_still_aborts() {
        let gate = StaticFeatureGate::with_disabled(["TCT_ATM_WITHDRAW", "MCT_DINING"]);
        let err = build_create_request(
            &[ControlType::Gambling, ControlType::Dining, ControlType::AtmWithdraw],
            &persona(),
            &gate,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Control type MCT_DINING is disabled");
    }
}
