use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Standard box edge, in inches, used when the user skips a dimension.
pub const DEFAULT_DIMENSION: Decimal = dec!(10);

/// One carrier offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub rate_id: String,
    pub carrier_code: String,
    pub carrier_name: String,
    #[serde(default)]
    pub service_code: String,
    pub service_type: String,
    pub amount: Decimal,
    #[serde(default)]
    pub estimated_days: Option<u32>,
}

impl Rate {
    /// Amount rounded to whole cents; rates sharing a carrier and bucket are duplicates.
    pub fn amount_bucket(&self) -> Decimal {
        self.amount.round_dp(2)
    }
}

/// Shipment data as collected so far. Any field may still be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShipmentShape {
    pub from_zip: Option<String>,
    pub to_zip: Option<String>,
    pub weight: Option<Decimal>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
}

impl ShipmentShape {
    /// Substitutes the default box for missing dimensions and normalises
    /// decimals so `5` and `5.0` share a cache entry.
    pub fn canonicalize(&self) -> CanonicalShape {
        let norm = |value: Option<Decimal>| value.map(|v| v.normalize());
        let dim = |value: Option<Decimal>| value.unwrap_or(DEFAULT_DIMENSION).normalize();
        CanonicalShape {
            from_zip: self.from_zip.as_deref().map(str::trim).map(str::to_owned),
            to_zip: self.to_zip.as_deref().map(str::trim).map(str::to_owned),
            weight: norm(self.weight),
            length: dim(self.length),
            width: dim(self.width),
            height: dim(self.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalShape {
    pub from_zip: Option<String>,
    pub to_zip: Option<String>,
    pub weight: Option<Decimal>,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

impl CanonicalShape {
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.from_zip.as_deref().unwrap_or_default(),
            self.to_zip.as_deref().unwrap_or_default(),
            self.weight.map(|w| w.to_string()).unwrap_or_default(),
            self.length,
            self.width,
            self.height
        )
    }

    /// Names of the fields the rate source cannot do without.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.from_zip.as_deref().is_none_or(str::is_empty) {
            missing.push("from_zip".to_string());
        }
        if self.to_zip.as_deref().is_none_or(str::is_empty) {
            missing.push("to_zip".to_string());
        }
        if self.weight.is_none() {
            missing.push("weight".to_string());
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRates {
    pub rates: Vec<Rate>,
    pub cached_at: DateTime<Utc>,
}

/// Raw answer of the external rate source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateFetch {
    pub success: bool,
    #[serde(default)]
    pub rates: Vec<Rate>,
    #[serde(default)]
    pub error_message: String,
}

impl RateFetch {
    pub fn ok(rates: Vec<Rate>) -> Self {
        Self {
            success: true,
            rates,
            error_message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            rates: Vec::new(),
            error_message: message.into(),
        }
    }
}
