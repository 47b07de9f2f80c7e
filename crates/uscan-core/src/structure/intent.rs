use serde::{Deserialize, Serialize};

use super::deal::{
    default_name, default_principal, BarrierInput, BarrierKind, BarrierLevel, BasketType,
    Structure, StructureInput,
};
use crate::error::UscanError;
use crate::types::{Price, Rate};
use crate::UscanResult;

/// Normalised deal terms handed over by the upstream deal parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealIntent {
    #[serde(default = "default_name")]
    pub name: String,
    /// Asset names, in basket order.
    pub basket: Vec<String>,
    pub maturity_months: u32,
    /// Knock-out level in percent of the initial price; `None` or 0 means
    /// no barrier.
    #[serde(default)]
    pub ko: Option<u32>,
    /// Annualised coupon, in percent.
    #[serde(default)]
    pub coupon: Rate,
    #[serde(default = "default_principal")]
    pub principal: Price,
}

impl DealIntent {
    /// Raw terms for this intent: every asset starts at 100 and the tenor is
    /// converted from months to years.
    pub fn to_structure_input(&self) -> StructureInput {
        let barriers = match self.ko {
            Some(pct) if pct > 0 => vec![BarrierInput {
                kind: BarrierKind::KnockOutDown,
                level: BarrierLevel::PercentOfInitial(f64::from(pct)),
            }],
            _ => Vec::new(),
        };

        StructureInput {
            name: self.name.clone(),
            underlyings: self.basket.clone(),
            initial_prices: None,
            barriers,
            basket_type: BasketType::WorstOf,
            maturity: f64::from(self.maturity_months) / 12.0,
            principal: Some(self.principal),
            coupon_rate: Some(self.coupon),
            other_props: Vec::new(),
        }
    }
}

impl Structure {
    /// Build a deal model from a parsed deal intent.
    pub fn from_intent(intent: &DealIntent) -> UscanResult<Self> {
        if intent.maturity_months == 0 {
            return Err(UscanError::malformed(
                "maturity_months",
                "Must be at least one month",
            ));
        }
        if intent.basket.is_empty() {
            return Err(UscanError::malformed(
                "basket",
                "At least one basket asset is required",
            ));
        }
        Structure::from_input(&intent.to_structure_input())
    }
}
