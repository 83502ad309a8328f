//! Response shapes returned to callers
//!
//! Views are partitioned by category. Impulse-delay strings from the rules
//! store are translated into timestamps and second counts here, so callers
//! never parse the store's clock formats themselves.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cardctl_types::{
    ControlDocument, ControlType, DocumentId, GlobalControl, MerchantControl, PersonaId,
    TransactionControl,
};

/// One control as shown to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlView {
    pub control_type: ControlType,
    pub enabled: bool,
    pub user_identifier: Option<PersonaId>,
    pub alert_threshold: Option<Decimal>,
    pub decline_threshold: Option<Decimal>,
    pub should_decline_all: bool,
    pub should_alert_on_decline: bool,
    /// Present while a removal cooldown is requested or running
    pub impulse_delay: Option<ImpulseDelayView>,
}

/// Impulse-delay window in absolute terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpulseDelayView {
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub period_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
}

/// Controls on one card, by category
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlsResponse {
    /// `None` when the card is not enrolled or nothing was fetched
    pub document_id: Option<DocumentId>,
    pub last_updated: Option<String>,
    pub global: Vec<ControlView>,
    pub merchant: Vec<ControlView>,
    pub transaction: Vec<ControlView>,
}

impl ControlsResponse {
    /// Response with no document behind it
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no controls are listed
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.merchant.is_empty() && self.transaction.is_empty()
    }

    /// Look up a listed control by type
    pub fn control(&self, control_type: ControlType) -> Option<&ControlView> {
        self.global
            .iter()
            .chain(&self.merchant)
            .chain(&self.transaction)
            .find(|view| view.control_type == control_type)
    }
}

impl From<&ControlDocument> for ControlsResponse {
    fn from(document: &ControlDocument) -> Self {
        Self {
            document_id: document.enrollment.document_id().cloned(),
            last_updated: Some(document.last_updated.clone()).filter(|s| !s.is_empty()),
            global: document.global_controls.iter().map(global_view).collect(),
            merchant: document.merchant_controls.iter().map(merchant_view).collect(),
            transaction: document
                .transaction_controls
                .iter()
                .map(transaction_view)
                .collect(),
        }
    }
}

fn global_view(control: &GlobalControl) -> ControlView {
    ControlView {
        control_type: ControlType::Global,
        enabled: control.control_enabled,
        user_identifier: control.user_identifier.clone(),
        alert_threshold: control.alert_threshold,
        decline_threshold: control.decline_threshold,
        should_decline_all: control.should_decline_all,
        should_alert_on_decline: control.should_alert_on_decline,
        impulse_delay: None,
    }
}

fn merchant_view(control: &MerchantControl) -> ControlView {
    ControlView {
        control_type: control.control_type,
        enabled: control.control_enabled,
        user_identifier: control.user_identifier.clone(),
        alert_threshold: control.alert_threshold,
        decline_threshold: control.decline_threshold,
        should_decline_all: control.should_decline_all,
        should_alert_on_decline: control.should_alert_on_decline,
        impulse_delay: impulse_delay_view(control),
    }
}

fn transaction_view(control: &TransactionControl) -> ControlView {
    ControlView {
        control_type: control.control_type,
        enabled: control.control_enabled,
        user_identifier: control.user_identifier.clone(),
        alert_threshold: control.alert_threshold,
        decline_threshold: control.decline_threshold,
        should_decline_all: control.should_decline_all,
        should_alert_on_decline: control.should_alert_on_decline,
        impulse_delay: None,
    }
}

fn impulse_delay_view(control: &MerchantControl) -> Option<ImpulseDelayView> {
    if control.impulse_delay_start.is_none()
        && control.impulse_delay_period.is_none()
        && control.impulse_delay_end.is_none()
        && control.impulse_delay_remaining.is_none()
    {
        return None;
    }

    Some(ImpulseDelayView {
        started_at: control.impulse_delay_start.as_deref().and_then(parse_timestamp),
        ends_at: control.impulse_delay_end.as_deref().and_then(parse_timestamp),
        period_secs: control.impulse_delay_period.as_deref().and_then(parse_clock),
        remaining_secs: control
            .impulse_delay_remaining
            .as_deref()
            .and_then(parse_clock),
    })
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        });
    if parsed.is_none() {
        debug!(value, "unparsable impulse delay timestamp");
    }
    parsed
}

/// `HH:MM` or `HH:MM:SS` to seconds; hours may exceed 24
fn parse_clock(value: &str) -> Option<u64> {
    let parts: Vec<&str> = value.split(':').collect();
    let numbers: Option<Vec<u64>> = parts.iter().map(|p| p.parse::<u64>().ok()).collect();
    let seconds = match numbers.as_deref() {
        Some(&[hours, minutes]) if minutes < 60 => clock_seconds(hours, minutes, 0),
        Some(&[hours, minutes, seconds]) if minutes < 60 && seconds < 60 => {
            clock_seconds(hours, minutes, seconds)
        }
        _ => None,
    };
    if seconds.is_none() {
        debug!(value, "unparsable impulse delay duration");
    }
    seconds
}

/// `None` when the hours field overflows
fn clock_seconds(hours: u64, minutes: u64, seconds: u64) -> Option<u64> {
    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes * 60 + seconds))
}
