use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::UscanError;
use crate::types::{Price, Rate, Years};
use crate::UscanResult;

/// Reference price assumed for every underlying when none is supplied.
pub const DEFAULT_INITIAL_PRICE: Price = 100.0;

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Barrier flavours. Only the terminal knock-out-down barrier is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierKind {
    #[serde(alias = "KO_DOWN", alias = "ko_down")]
    KnockOutDown,
}

impl BarrierKind {
    /// Whether a basket value at the observation point breaches `level`.
    pub fn is_breached(&self, level: Price, basket: Price) -> bool {
        match self {
            BarrierKind::KnockOutDown => basket < level,
        }
    }
}

impl std::fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarrierKind::KnockOutDown => write!(f, "KO_DOWN"),
        }
    }
}

/// Cross-asset aggregation rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketType {
    #[default]
    #[serde(alias = "WORST_OF")]
    WorstOf,
}

impl BasketType {
    /// Collapse one observation of every underlying into the basket value.
    pub fn aggregate(&self, prices: &[Price]) -> Price {
        match self {
            BasketType::WorstOf => prices.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

impl std::fmt::Display for BasketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BasketType::WorstOf => write!(f, "WORST_OF"),
        }
    }
}

/// A resolved barrier: kind plus absolute level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    pub kind: BarrierKind,
    pub level: Price,
}

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// Barrier level as quoted in a raw deal.
///
/// Deserialises from a JSON number (absolute level) or a string. Strings
/// ending in `%` are a percentage of the mean initial price; any other
/// numeric string is an absolute level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarrierLevel {
    Absolute(Price),
    /// Percentage points, e.g. `98.0` for `"98%"`.
    PercentOfInitial(f64),
}

impl BarrierLevel {
    /// Resolve to an absolute level against the mean initial price.
    pub fn resolve(&self, mean_initial: Price) -> Price {
        match *self {
            BarrierLevel::Absolute(level) => level,
            BarrierLevel::PercentOfInitial(pct) => pct / 100.0 * mean_initial,
        }
    }
}

impl FromStr for BarrierLevel {
    type Err = UscanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (number, is_pct) = match trimmed.strip_suffix('%') {
            Some(stripped) => (stripped.trim(), true),
            None => (trimmed, false),
        };
        let value: f64 = number.parse().map_err(|_| {
            UscanError::malformed("barriers.level", format!("cannot parse '{s}' as a level"))
        })?;
        Ok(if is_pct {
            BarrierLevel::PercentOfInitial(value)
        } else {
            BarrierLevel::Absolute(value)
        })
    }
}

impl Serialize for BarrierLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            BarrierLevel::Absolute(level) => serializer.serialize_f64(level),
            BarrierLevel::PercentOfInitial(pct) => serializer.serialize_str(&format!("{pct}%")),
        }
    }
}

impl<'de> Deserialize<'de> for BarrierLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(level) => Ok(BarrierLevel::Absolute(level)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierInput {
    #[serde(alias = "type")]
    pub kind: BarrierKind,
    pub level: BarrierLevel,
}

/// Raw deal terms as supplied by a caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureInput {
    #[serde(default = "default_name")]
    pub name: String,
    pub underlyings: Vec<String>,
    /// One per underlying; defaults to 100 each when omitted.
    #[serde(default)]
    pub initial_prices: Option<Vec<Price>>,
    #[serde(default)]
    pub barriers: Vec<BarrierInput>,
    #[serde(default)]
    pub basket_type: BasketType,
    /// Years.
    #[serde(default = "default_maturity")]
    pub maturity: Years,
    /// Defaults to the `other_props` entry, then 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Price>,
    /// Annualised, in percent. Defaults to the `other_props` entry, then 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_rate: Option<Rate>,
    /// Legacy single-key property list, e.g.
    /// `[{"principal": 100}, {"coupon": 11.0}]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_props: Vec<DealProp>,
}

/// One entry of a legacy `other_props` list. Unrecognised keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealProp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Rate>,
}

impl StructureInput {
    /// Top-level `principal`, else the first `other_props` entry carrying one.
    pub fn resolved_principal(&self) -> Price {
        self.principal
            .or_else(|| self.other_props.iter().find_map(|p| p.principal))
            .unwrap_or_else(default_principal)
    }

    /// Top-level `coupon_rate`, else the first `other_props` coupon, else 0.
    pub fn resolved_coupon_rate(&self) -> Rate {
        self.coupon_rate
            .or_else(|| self.other_props.iter().find_map(|p| p.coupon))
            .unwrap_or(0.0)
    }
}

pub(crate) fn default_name() -> String {
    "Note".to_string()
}

fn default_maturity() -> Years {
    1.0
}

pub(crate) fn default_principal() -> Price {
    100.0
}

// ---------------------------------------------------------------------------
// Deal model
// ---------------------------------------------------------------------------

/// Immutable economic terms of a worst-of knock-out note.
///
/// The downside branch pays the basket's terminal *price level* as cash in
/// the principal's unit, so initial prices are expected to be normalised so
/// that each equals the principal (100 per asset by convention). Deals that
/// break the convention still value, but `is_price_normalised` reports it
/// and the valuation envelope carries a warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Structure {
    name: String,
    underlyings: Vec<String>,
    initial_prices: Vec<Price>,
    barriers: Vec<Barrier>,
    basket_type: BasketType,
    maturity: Years,
    principal: Price,
    coupon_rate: Rate,
}

impl Structure {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        underlyings: Vec<String>,
        initial_prices: Vec<Price>,
        barriers: Vec<Barrier>,
        basket_type: BasketType,
        maturity: Years,
        principal: Price,
        coupon_rate: Rate,
    ) -> UscanResult<Self> {
        if underlyings.is_empty() {
            return Err(UscanError::malformed(
                "underlyings",
                "At least one underlying is required",
            ));
        }
        if initial_prices.len() != underlyings.len() {
            return Err(UscanError::malformed(
                "initial_prices",
                format!(
                    "{} prices supplied for {} underlyings",
                    initial_prices.len(),
                    underlyings.len()
                ),
            ));
        }
        if let Some((i, p)) = initial_prices
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p <= 0.0)
        {
            return Err(UscanError::malformed(
                "initial_prices",
                format!("Price for '{}' must be positive, got {p}", underlyings[i]),
            ));
        }
        if !maturity.is_finite() || maturity <= 0.0 {
            return Err(UscanError::malformed(
                "maturity",
                format!("Must be positive, got {maturity}"),
            ));
        }
        if !principal.is_finite() || principal <= 0.0 {
            return Err(UscanError::malformed(
                "principal",
                format!("Must be positive, got {principal}"),
            ));
        }
        if !coupon_rate.is_finite() {
            return Err(UscanError::malformed("coupon_rate", "Must be finite"));
        }
        // Zero is allowed and acts as an unreachable barrier.
        if let Some(b) = barriers
            .iter()
            .find(|b| !b.level.is_finite() || b.level < 0.0)
        {
            return Err(UscanError::malformed(
                "barriers.level",
                format!("{} level must be non-negative, got {}", b.kind, b.level),
            ));
        }

        Ok(Self {
            name: name.into(),
            underlyings,
            initial_prices,
            barriers,
            basket_type,
            maturity,
            principal,
            coupon_rate,
        })
    }

    /// Build from raw terms, defaulting prices and resolving percentage
    /// barrier levels against the mean initial price.
    pub fn from_input(input: &StructureInput) -> UscanResult<Self> {
        let initial_prices = match &input.initial_prices {
            Some(prices) => prices.clone(),
            None => vec![DEFAULT_INITIAL_PRICE; input.underlyings.len()],
        };

        let mean_initial = if initial_prices.is_empty() {
            0.0
        } else {
            initial_prices.iter().sum::<f64>() / initial_prices.len() as f64
        };

        let barriers = input
            .barriers
            .iter()
            .map(|b| Barrier {
                kind: b.kind,
                level: b.level.resolve(mean_initial),
            })
            .collect();

        Self::new(
            input.name.clone(),
            input.underlyings.clone(),
            initial_prices,
            barriers,
            input.basket_type,
            input.maturity,
            input.resolved_principal(),
            input.resolved_coupon_rate(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn underlyings(&self) -> &[String] {
        &self.underlyings
    }

    pub fn initial_prices(&self) -> &[Price] {
        &self.initial_prices
    }

    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    pub fn basket_type(&self) -> BasketType {
        self.basket_type
    }

    pub fn maturity(&self) -> Years {
        self.maturity
    }

    pub fn principal(&self) -> Price {
        self.principal
    }

    pub fn coupon_rate(&self) -> Rate {
        self.coupon_rate
    }

    pub fn n_assets(&self) -> usize {
        self.underlyings.len()
    }

    /// Highest knock-out-down level, i.e. the one that governs survival.
    pub fn knock_out_level(&self) -> Option<Price> {
        self.barriers
            .iter()
            .filter(|b| b.kind == BarrierKind::KnockOutDown)
            .map(|b| b.level)
            .reduce(f64::max)
    }

    /// Coupon paid on survival, prorated over the note's life.
    pub fn coupon_payment(&self) -> Price {
        self.coupon_rate / 100.0 * self.maturity * self.principal
    }

    /// True when every initial price equals the principal.
    pub fn is_price_normalised(&self) -> bool {
        let tol = 1e-9 * self.principal.max(1.0);
        self.initial_prices
            .iter()
            .all(|p| (p - self.principal).abs() <= tol)
    }

    /// Whether the basket value at maturity avoids every barrier.
    pub fn survives(&self, basket: Price) -> bool {
        !self
            .barriers
            .iter()
            .any(|b| b.kind.is_breached(b.level, basket))
    }

    /// Cash received at maturity for a given basket value.
    pub fn gross_payoff(&self, basket: Price) -> Price {
        if self.survives(basket) {
            self.principal + self.coupon_payment()
        } else {
            basket
        }
    }

    /// Gross payoff less the principal invested.
    pub fn net_payoff(&self, basket: Price) -> Price {
        self.gross_payoff(basket) - self.principal
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
