//! Control types and their categories
//!
//! `ControlType::category` is the single mapping table from control type to
//! category. Adding a control type means adding one variant, one identifier
//! and one row in that match.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CardControlError;

/// Category of a control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Card-wide control; a card has at most one active
    Global,
    /// Merchant-category control
    Merchant,
    /// Transaction-type control
    Transaction,
}

/// Every control type a card can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlType {
    // Global
    Global,

    // Merchant categories
    AdultEntertainment,
    Airfare,
    Alcohol,
    ApparelAndAccessories,
    Automotive,
    CarRental,
    Dining,
    Electronics,
    Gambling,
    GasAndPetroleum,
    Grocery,
    HotelAndLodging,
    Household,
    PersonalCare,
    SmokeAndTobacco,
    SportAndRecreation,

    // Transaction types
    AtmWithdraw,
    AutoPay,
    BrickAndMortar,
    Contactless,
    CrossBorder,
    ECommerce,
    PurchaseReturn,
}

impl ControlType {
    /// All defined control types
    pub const ALL: [ControlType; 24] = [
        Self::Global,
        Self::AdultEntertainment,
        Self::Airfare,
        Self::Alcohol,
        Self::ApparelAndAccessories,
        Self::Automotive,
        Self::CarRental,
        Self::Dining,
        Self::Electronics,
        Self::Gambling,
        Self::GasAndPetroleum,
        Self::Grocery,
        Self::HotelAndLodging,
        Self::Household,
        Self::PersonalCare,
        Self::SmokeAndTobacco,
        Self::SportAndRecreation,
        Self::AtmWithdraw,
        Self::AutoPay,
        Self::BrickAndMortar,
        Self::Contactless,
        Self::CrossBorder,
        Self::ECommerce,
        Self::PurchaseReturn,
    ];

    /// Classify this control type
    pub const fn category(self) -> Category {
        match self {
            Self::Global => Category::Global,
            Self::AdultEntertainment
            | Self::Airfare
            | Self::Alcohol
            | Self::ApparelAndAccessories
            | Self::Automotive
            | Self::CarRental
            | Self::Dining
            | Self::Electronics
            | Self::Gambling
            | Self::GasAndPetroleum
            | Self::Grocery
            | Self::HotelAndLodging
            | Self::Household
            | Self::PersonalCare
            | Self::SmokeAndTobacco
            | Self::SportAndRecreation => Category::Merchant,
            Self::AtmWithdraw
            | Self::AutoPay
            | Self::BrickAndMortar
            | Self::Contactless
            | Self::CrossBorder
            | Self::ECommerce
            | Self::PurchaseReturn => Category::Transaction,
        }
    }

    /// Wire identifier, also the feature-gate key
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "GCT_GLOBAL",
            Self::AdultEntertainment => "MCT_ADULT_ENTERTAINMENT",
            Self::Airfare => "MCT_AIRFARE",
            Self::Alcohol => "MCT_ALCOHOL",
            Self::ApparelAndAccessories => "MCT_APPAREL_AND_ACCESSORIES",
            Self::Automotive => "MCT_AUTOMOTIVE",
            Self::CarRental => "MCT_CAR_RENTAL",
            Self::Dining => "MCT_DINING",
            Self::Electronics => "MCT_ELECTRONICS",
            Self::Gambling => "MCT_GAMBLING",
            Self::GasAndPetroleum => "MCT_GAS_AND_PETROLEUM",
            Self::Grocery => "MCT_GROCERY",
            Self::HotelAndLodging => "MCT_HOTEL_AND_LODGING",
            Self::Household => "MCT_HOUSEHOLD",
            Self::PersonalCare => "MCT_PERSONAL_CARE",
            Self::SmokeAndTobacco => "MCT_SMOKE_AND_TOBACCO",
            Self::SportAndRecreation => "MCT_SPORT_AND_RECREATION",
            Self::AtmWithdraw => "TCT_ATM_WITHDRAW",
            Self::AutoPay => "TCT_AUTO_PAY",
            Self::BrickAndMortar => "TCT_BRICK_AND_MORTAR",
            Self::Contactless => "TCT_CONTACTLESS",
            Self::CrossBorder => "TCT_CROSS_BORDER",
            Self::ECommerce => "TCT_E_COMMERCE",
            Self::PurchaseReturn => "TCT_PURCHASE_RETURN",
        }
    }

    /// Whether removal of this control goes through the impulse-delay cooldown
    pub const fn has_impulse_delay(self) -> bool {
        matches!(self, Self::Gambling)
    }
}

/// Classify a control type
pub const fn classify(control_type: ControlType) -> Category {
    control_type.category()
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = CardControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| {
                CardControlError::validation("control_type", format!("unknown control type {s:?}"))
            })
    }
}

impl TryFrom<String> for ControlType {
    type Error = CardControlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControlType> for String {
    fn from(value: ControlType) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn classifier_is_total_and_prefix_consistent() {
        for ty in ControlType::ALL {
            let expected = match &ty.as_str()[..4] {
                "GCT_" => Category::Global,
                "MCT_" => Category::Merchant,
                "TCT_" => Category::Transaction,
                other => panic!("unexpected prefix {other}"),
            };
            assert_eq!(classify(ty), expected, "{ty}");
        }
    }

    #[test]
    fn identifiers_are_unique_and_parse_back() {
        let ids: HashSet<_> = ControlType::ALL.iter().map(|ty| ty.as_str()).collect();
        assert_eq!(ids.len(), ControlType::ALL.len());
        for ty in ControlType::ALL {
            assert_eq!(ty.as_str().parse::<ControlType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_identifier_is_a_validation_failure() {
        let err = "MCT_SPACE_TRAVEL".parse::<ControlType>().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILURE");
        assert!(serde_json::from_str::<ControlType>("\"CONTROL_TYPE_UNSPECIFIED\"").is_err());
    }

    #[test]
    fn only_gambling_has_impulse_delay() {
        let delayed: Vec<_> = ControlType::ALL
            .into_iter()
            .filter(|ty| ty.has_impulse_delay())
            .collect();
        assert_eq!(delayed, vec![ControlType::Gambling]);
    }
}
