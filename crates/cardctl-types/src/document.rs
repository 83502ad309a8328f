//! Control documents
//!
//! A control document is the rules store's record of every control on one
//! card. The engine only ever holds a private copy for the length of a call.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::control::ControlType;
use crate::identity::{DocumentId, PersonaId};

/// Wire value the rules store uses for a card that was never enrolled
pub const NOT_ENROLLED: &str = "NOT_ENROLLED";

/// Cooldown period requested on the first removal of a gambling block
pub const IMPULSE_DELAY_PERIOD: &str = "48:00";

/// `impulseDelayRemaining` value once the cooldown has run out
pub const IMPULSE_DELAY_EXPIRED: &str = "00:00:00";

/// Enrollment state of a card with the rules store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Enrollment {
    /// Registered; the store assigned this document id
    Enrolled(DocumentId),
    /// Never registered
    NotEnrolled,
}

impl Enrollment {
    /// Document id when enrolled
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Self::Enrolled(id) => Some(id),
            Self::NotEnrolled => None,
        }
    }

    /// Whether the card is enrolled
    pub fn is_enrolled(&self) -> bool {
        matches!(self, Self::Enrolled(_))
    }
}

impl From<String> for Enrollment {
    fn from(value: String) -> Self {
        if value.is_empty() || value == NOT_ENROLLED {
            Self::NotEnrolled
        } else {
            Self::Enrolled(DocumentId::new(value))
        }
    }
}

impl From<Enrollment> for String {
    fn from(value: Enrollment) -> Self {
        match value {
            Enrollment::Enrolled(id) => id.as_str().to_string(),
            Enrollment::NotEnrolled => NOT_ENROLLED.to_string(),
        }
    }
}

/// Card-wide control
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalControl {
    pub control_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<PersonaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_threshold: Option<Decimal>,
    #[serde(default)]
    pub should_decline_all: bool,
    #[serde(default)]
    pub should_alert_on_decline: bool,
    #[serde(default)]
    pub decline_all_non_tokenized_transactions: bool,
}

/// Merchant-category control
///
/// The impulse-delay fields are written by the rules store's clock. The
/// engine only ever sets `impulse_delay_period`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantControl {
    pub control_type: ControlType,
    pub control_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<PersonaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_threshold: Option<Decimal>,
    #[serde(default)]
    pub should_decline_all: bool,
    #[serde(default)]
    pub should_alert_on_decline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impulse_delay_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impulse_delay_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impulse_delay_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impulse_delay_remaining: Option<String>,
}

/// Where a merchant control sits in the impulse-delay cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpulseDelayState {
    /// No cooldown requested
    NoDelay,
    /// Cooldown requested or running
    DelayActive,
    /// Cooldown ran out; the control may be removed
    DelayExpired,
}

impl MerchantControl {
    /// An enabled control with every optional field unset
    pub fn new(control_type: ControlType) -> Self {
        Self {
            control_type,
            control_enabled: true,
            user_identifier: None,
            alert_threshold: None,
            decline_threshold: None,
            should_decline_all: false,
            should_alert_on_decline: false,
            impulse_delay_start: None,
            impulse_delay_period: None,
            impulse_delay_end: None,
            impulse_delay_remaining: None,
        }
    }

    /// Current cooldown state, as reported by the rules store
    ///
    /// A requested period the store has not started counting yet is active.
    pub fn impulse_delay_state(&self) -> ImpulseDelayState {
        match self.impulse_delay_remaining.as_deref() {
            Some(IMPULSE_DELAY_EXPIRED) => ImpulseDelayState::DelayExpired,
            Some(_) => ImpulseDelayState::DelayActive,
            None if self.impulse_delay_period.is_some() || self.impulse_delay_start.is_some() => {
                ImpulseDelayState::DelayActive
            }
            None => ImpulseDelayState::NoDelay,
        }
    }
}

/// Transaction-type control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionControl {
    pub control_type: ControlType,
    pub control_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<PersonaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_threshold: Option<Decimal>,
    #[serde(default)]
    pub should_decline_all: bool,
    #[serde(default)]
    pub should_alert_on_decline: bool,
}

impl TransactionControl {
    /// An enabled control with every optional field unset
    pub fn new(control_type: ControlType) -> Self {
        Self {
            control_type,
            control_enabled: true,
            user_identifier: None,
            alert_threshold: None,
            decline_threshold: None,
            should_decline_all: false,
            should_alert_on_decline: false,
        }
    }
}

/// All controls on one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDocument {
    /// Enrollment identity (`documentId` on the wire)
    #[serde(rename = "documentId")]
    pub enrollment: Enrollment,
    /// Opaque timestamp of the last store write
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub global_controls: Vec<GlobalControl>,
    #[serde(default)]
    pub merchant_controls: Vec<MerchantControl>,
    #[serde(default)]
    pub transaction_controls: Vec<TransactionControl>,
}

impl ControlDocument {
    /// Empty document for a card that was never enrolled
    pub fn not_enrolled() -> Self {
        Self::with_enrollment(Enrollment::NotEnrolled)
    }

    /// Empty document for a freshly enrolled card
    pub fn enrolled(document_id: DocumentId) -> Self {
        Self::with_enrollment(Enrollment::Enrolled(document_id))
    }

    fn with_enrollment(enrollment: Enrollment) -> Self {
        Self {
            enrollment,
            last_updated: String::new(),
            global_controls: Vec::new(),
            merchant_controls: Vec::new(),
            transaction_controls: Vec::new(),
        }
    }

    /// Whether the document carries no controls at all
    pub fn is_empty(&self) -> bool {
        self.global_controls.is_empty()
            && self.merchant_controls.is_empty()
            && self.transaction_controls.is_empty()
    }
}

/// Outbound create/update payload
///
/// Built fresh for every store call; never a reused fetched document. An
/// update sends every list, so an empty list clears that category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    #[serde(default)]
    pub global_controls: Vec<GlobalControl>,
    #[serde(default)]
    pub merchant_controls: Vec<MerchantControl>,
    #[serde(default)]
    pub transaction_controls: Vec<TransactionControl>,
}

impl ControlRequest {
    /// Full-replacement payload carrying every list of `document`
    pub fn replacing(document: &ControlDocument) -> Self {
        Self {
            global_controls: document.global_controls.clone(),
            merchant_controls: document.merchant_controls.clone(),
            transaction_controls: document.transaction_controls.clone(),
        }
    }

    /// Whether the payload carries no entries
    pub fn is_empty(&self) -> bool {
        self.global_controls.is_empty()
            && self.merchant_controls.is_empty()
            && self.transaction_controls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_sentinel_maps_to_sum_type() {
        let doc: ControlDocument =
            serde_json::from_str(r#"{"documentId":"NOT_ENROLLED","lastUpdated":""}"#).unwrap();
        assert_eq!(doc.enrollment, Enrollment::NotEnrolled);
        assert!(doc.is_empty());

        let doc: ControlDocument = serde_json::from_str(r#"{"documentId":"ctc-1"}"#).unwrap();
        assert_eq!(doc.enrollment.document_id().map(DocumentId::as_str), Some("ctc-1"));

        let json = serde_json::to_value(ControlDocument::not_enrolled()).unwrap();
        assert_eq!(json["documentId"], NOT_ENROLLED);
    }

    #[test]
    fn merchant_control_uses_wire_names() {
        let json = r#"{
            "controlType": "MCT_GAMBLING",
            "controlEnabled": true,
            "impulseDelayPeriod": "48:00",
            "impulseDelayRemaining": "47:59:10"
        }"#;
        let control: MerchantControl = serde_json::from_str(json).unwrap();
        assert_eq!(control.control_type, ControlType::Gambling);
        assert_eq!(control.impulse_delay_state(), ImpulseDelayState::DelayActive);
    }

    #[test]
    fn impulse_delay_states() {
        let mut control = MerchantControl::new(ControlType::Gambling);
        assert_eq!(control.impulse_delay_state(), ImpulseDelayState::NoDelay);

        control.impulse_delay_period = Some(IMPULSE_DELAY_PERIOD.to_string());
        assert_eq!(control.impulse_delay_state(), ImpulseDelayState::DelayActive);

        control.impulse_delay_remaining = Some("12:00:00".to_string());
        assert_eq!(control.impulse_delay_state(), ImpulseDelayState::DelayActive);

        control.impulse_delay_remaining = Some(IMPULSE_DELAY_EXPIRED.to_string());
        assert_eq!(control.impulse_delay_state(), ImpulseDelayState::DelayExpired);
    }
}
