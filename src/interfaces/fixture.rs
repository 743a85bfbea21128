//! Canned rate source for replays and demos.

use crate::domain::ports::RateSource;
use crate::domain::rate::{CanonicalShape, Rate, RateFetch};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    Rates(Vec<Rate>),
    Fetch(RateFetch),
}

/// Answers every lookup with the same fetch result.
#[derive(Debug, Clone)]
pub struct FixtureRateSource {
    answer: RateFetch,
}

impl FixtureRateSource {
    pub fn new(answer: RateFetch) -> Self {
        Self { answer }
    }

    /// Accepts either a bare JSON array of rates or a full
    /// `{ "success", "rates", "error_message" }` object.
    pub fn from_json(json: &str) -> Result<Self> {
        let answer = match serde_json::from_str(json)? {
            FixtureFile::Rates(rates) => RateFetch::ok(rates),
            FixtureFile::Fetch(fetch) => fetch,
        };
        Ok(Self::new(answer))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// A small spread of USPS, UPS and FedEx services.
    pub fn sample() -> Self {
        let rate = |id: &str, carrier: &str, name: &str, service: &str, label: &str, cents: i64, days| Rate {
            rate_id: id.to_string(),
            carrier_code: carrier.to_string(),
            carrier_name: name.to_string(),
            service_code: service.to_string(),
            service_type: label.to_string(),
            amount: rust_decimal::Decimal::new(cents, 2),
            estimated_days: Some(days),
        };
        Self::new(RateFetch::ok(vec![
            rate("se-1", "usps", "USPS", "usps_ground_advantage", "Ground Advantage", 845, 5),
            rate("se-2", "usps", "USPS", "usps_priority_mail", "Priority Mail", 1230, 2),
            rate("se-3", "ups", "UPS", "ups_ground", "UPS Ground", 1475, 4),
            rate("se-4", "fedex", "FedEx", "fedex_ground", "FedEx Ground", 1390, 4),
            rate("se-5", "fedex", "FedEx", "fedex_2day", "FedEx 2Day", 2810, 2),
        ]))
    }
}

#[async_trait]
impl RateSource for FixtureRateSource {
    async fn fetch_rates(&self, shape: &CanonicalShape) -> RateFetch {
        tracing::debug!(cache_key = %shape.cache_key(), "fixture rate source called");
        self.answer.clone()
    }
}
