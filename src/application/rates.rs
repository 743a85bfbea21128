use crate::domain::ports::{ClockRef, RateCacheBox, RateSourceBox};
use crate::domain::rate::{CachedRates, Rate, ShipmentShape};
use crate::error::{Result, ShipError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Filtering and balancing rules applied to every fresh rate list.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    pub excluded_carriers: HashSet<String>,
    /// Allowed service codes per carrier. Carriers absent from the map keep
    /// every service.
    pub allowed_services: HashMap<String, HashSet<String>>,
    pub max_per_carrier: usize,
    pub max_total: usize,
    pub cache_ttl: chrono::Duration,
    pub fetch_timeout: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        let services = |codes: &[&str]| codes.iter().map(|c| c.to_string()).collect::<HashSet<_>>();
        let allowed_services = HashMap::from([
            (
                "usps".to_string(),
                services(&[
                    "usps_priority_mail",
                    "usps_priority_mail_express",
                    "usps_ground_advantage",
                    "usps_first_class_mail",
                ]),
            ),
            (
                "ups".to_string(),
                services(&[
                    "ups_ground",
                    "ups_3_day_select",
                    "ups_2nd_day_air",
                    "ups_next_day_air_saver",
                    "ups_next_day_air",
                ]),
            ),
            (
                "fedex".to_string(),
                services(&[
                    "fedex_ground",
                    "fedex_home_delivery",
                    "fedex_express_saver",
                    "fedex_2day",
                    "fedex_standard_overnight",
                ]),
            ),
        ]);

        Self {
            excluded_carriers: HashSet::from(["globalpost".to_string()]),
            allowed_services,
            max_per_carrier: 5,
            max_total: 15,
            cache_ttl: chrono::Duration::seconds(60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl RatePolicy {
    fn is_allowed(&self, rate: &Rate) -> bool {
        let carrier = rate.carrier_code.to_ascii_lowercase();
        if self.excluded_carriers.contains(&carrier) {
            return false;
        }
        match self.allowed_services.get(&carrier) {
            Some(allowed) => allowed.contains(&rate.service_code.to_ascii_lowercase()),
            None => true,
        }
    }

    /// Filters, deduplicates and balances a raw rate list.
    ///
    /// Duplicates are rates of the same carrier within the same cent; the
    /// cheapest survives. Each carrier contributes at most `max_per_carrier`
    /// rates, picked round-robin with the cheapest carrier first, and the
    /// final list is sorted by price.
    pub fn balance(&self, rates: Vec<Rate>) -> Vec<Rate> {
        let mut by_carrier: BTreeMap<String, Vec<Rate>> = BTreeMap::new();
        for rate in rates.into_iter().filter(|r| self.is_allowed(r)) {
            by_carrier
                .entry(rate.carrier_code.to_ascii_lowercase())
                .or_default()
                .push(rate);
        }

        let mut groups: Vec<Vec<Rate>> = by_carrier
            .into_values()
            .map(|mut group| {
                group.sort_by(|a, b| a.amount.cmp(&b.amount));
                group.dedup_by(|later, earlier| later.amount_bucket() == earlier.amount_bucket());
                group.truncate(self.max_per_carrier);
                group
            })
            .filter(|group| !group.is_empty())
            .collect();
        // Stable sort keeps the alphabetical carrier order as the tie-break.
        groups.sort_by(|a, b| a[0].amount.cmp(&b[0].amount));

        let rounds = groups.iter().map(Vec::len).max().unwrap_or(0);
        let mut balanced = Vec::new();
        for round in 0..rounds {
            for group in &groups {
                if let Some(rate) = group.get(round) {
                    balanced.push(rate.clone());
                }
            }
        }

        balanced.truncate(self.max_total);
        balanced.sort_by(|a, b| a.amount.cmp(&b.amount));
        balanced
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub rates: Vec<Rate>,
    pub from_cache: bool,
}

/// Fetches, filters and caches carrier rates for a shipment.
pub struct RateEngine {
    source: RateSourceBox,
    cache: RateCacheBox,
    clock: ClockRef,
    policy: RatePolicy,
}

impl RateEngine {
    pub fn new(source: RateSourceBox, cache: RateCacheBox, clock: ClockRef, policy: RatePolicy) -> Self {
        Self {
            source,
            cache,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    pub async fn get_rates(&self, shape: &ShipmentShape) -> Result<RateQuote> {
        let canonical = shape.canonicalize();
        let key = canonical.cache_key();

        if let Some(rates) = self.cached(&key).await {
            tracing::info!(cache_key = %key, count = rates.len(), "rate cache hit");
            return Ok(RateQuote {
                rates,
                from_cache: true,
            });
        }

        let missing = canonical.missing_fields();
        if !missing.is_empty() {
            return Err(ShipError::IncompleteShipmentData(missing));
        }

        let started = std::time::Instant::now();
        let fetch = tokio::time::timeout(self.policy.fetch_timeout, self.source.fetch_rates(&canonical))
            .await
            .map_err(|_| {
                ShipError::RateSourceTimeout(format!(
                    "no answer within {}ms",
                    self.policy.fetch_timeout.as_millis()
                ))
            })?;
        tracing::info!(
            cache_key = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = fetch.success,
            "rate source answered"
        );

        if !fetch.success {
            return Err(if fetch.error_message.to_lowercase().contains("timeout") {
                ShipError::RateSourceTimeout(fetch.error_message)
            } else {
                ShipError::RateSourceError(fetch.error_message)
            });
        }

        let raw = fetch.rates.len();
        let rates = self.policy.balance(fetch.rates);
        tracing::debug!(raw, kept = rates.len(), "rates filtered");
        if rates.is_empty() {
            return Err(ShipError::NoRatesAvailable);
        }

        let entry = CachedRates {
            rates: rates.clone(),
            cached_at: self.clock.now(),
        };
        if let Err(e) = self.cache.put(&key, entry).await {
            tracing::warn!(cache_key = %key, error = %e, "failed to write rate cache");
        }

        Ok(RateQuote {
            rates,
            from_cache: false,
        })
    }

    /// Drops the cached entry for this shipment and fetches again.
    pub async fn refresh(&self, shape: &ShipmentShape) -> Result<RateQuote> {
        let key = shape.canonicalize().cache_key();
        if let Err(e) = self.cache.invalidate(&key).await {
            tracing::warn!(cache_key = %key, error = %e, "failed to invalidate rate cache");
        }
        self.get_rates(shape).await
    }

    /// Removes cache entries past their TTL.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.cache
            .purge_older_than(self.clock.now() - self.policy.cache_ttl)
            .await
    }

    async fn cached(&self, key: &str) -> Option<Vec<Rate>> {
        match self.cache.get(key).await {
            Ok(Some(entry)) if self.clock.now() - entry.cached_at < self.policy.cache_ttl => {
                Some(entry.rates)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "rate cache unavailable, fetching");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RateSource;
    use crate::domain::rate::{CanonicalShape, RateFetch};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryRateCache;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rate(carrier: &str, service: &str, amount: Decimal) -> Rate {
        Rate {
            rate_id: format!("{carrier}-{service}-{amount}"),
            carrier_code: carrier.into(),
            carrier_name: carrier.to_uppercase(),
            service_code: service.into(),
            service_type: service.into(),
            amount,
            estimated_days: None,
        }
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        answer: RateFetch,
    }

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch_rates(&self, _shape: &CanonicalShape) -> RateFetch {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    struct SlowSource;

    #[async_trait]
    impl RateSource for SlowSource {
        async fn fetch_rates(&self, _shape: &CanonicalShape) -> RateFetch {
            tokio::time::sleep(Duration::from_secs(60)).await;
            RateFetch::ok(Vec::new())
        }
    }

    fn shape() -> ShipmentShape {
        ShipmentShape {
            from_zip: Some("94102".into()),
            to_zip: Some("90001".into()),
            weight: Some(dec!(5)),
            ..Default::default()
        }
    }

    fn engine(answer: RateFetch, clock: &ManualClock) -> (RateEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: calls.clone(),
            answer,
        };
        let engine = RateEngine::new(
            Box::new(source),
            Box::new(InMemoryRateCache::new()),
            Arc::new(clock.clone()),
            RatePolicy::default(),
        );
        (engine, calls)
    }

    #[test]
    fn test_balance_caps_dominant_carrier() {
        let mut rates: Vec<Rate> = (0..20)
            .map(|i| rate("acme", &format!("svc{i}"), Decimal::from(5 + i)))
            .collect();
        rates.push(rate("bolt", "only", dec!(40)));

        let balanced = RatePolicy::default().balance(rates);

        assert_eq!(balanced.iter().filter(|r| r.carrier_code == "acme").count(), 5);
        assert!(balanced.iter().any(|r| r.carrier_code == "bolt"));
        assert!(balanced.windows(2).all(|w| w[0].amount <= w[1].amount));
    }

    #[test]
    fn test_balance_with_zero_carrier_cap_is_empty() {
        let policy = RatePolicy {
            max_per_carrier: 0,
            ..RatePolicy::default()
        };
        let rates = vec![rate("acme", "a", dec!(9)), rate("bolt", "b", dec!(7))];

        assert!(policy.balance(rates).is_empty());
    }

    #[test]
    fn test_balance_dedupes_within_a_cent_keeping_cheapest() {
        let rates = vec![
            rate("acme", "a", dec!(10.004)),
            rate("acme", "b", dec!(10.001)),
            rate("bolt", "c", dec!(10.00)),
        ];
        let balanced = RatePolicy::default().balance(rates);

        assert_eq!(balanced.len(), 2);
        let acme = balanced.iter().find(|r| r.carrier_code == "acme").unwrap();
        assert_eq!(acme.amount, dec!(10.001));
    }

    #[test]
    fn test_balance_applies_deny_and_allow_lists() {
        let rates = vec![
            rate("globalpost", "gp_std", dec!(3)),
            rate("usps", "usps_media_mail", dec!(4)),
            rate("usps", "usps_priority_mail", dec!(8)),
            rate("dhl", "anything", dec!(20)),
        ];
        let balanced = RatePolicy::default().balance(rates);
        let services: Vec<&str> = balanced.iter().map(|r| r.service_code.as_str()).collect();
        assert_eq!(services, vec!["usps_priority_mail", "anything"]);
    }

    #[test]
    fn test_balance_truncates_to_overall_max() {
        let rates: Vec<Rate> = ["a", "b", "c", "d"]
            .iter()
            .flat_map(|carrier| (0..5).map(move |i| rate(carrier, &format!("s{i}"), Decimal::from(10 + i))))
            .collect();
        let balanced = RatePolicy::default().balance(rates);
        assert_eq!(balanced.len(), 15);
        for carrier in ["a", "b", "c", "d"] {
            assert!(balanced.iter().any(|r| r.carrier_code == carrier));
        }
    }

    #[tokio::test]
    async fn test_second_lookup_within_ttl_hits_cache() {
        let clock = ManualClock::default();
        let (engine, calls) = engine(RateFetch::ok(vec![rate("ups", "ups_ground", dec!(12))]), &clock);

        let first = engine.get_rates(&shape()).await.unwrap();
        assert!(!first.from_cache);

        clock.advance(chrono::Duration::seconds(30));
        let explicit_dims = ShipmentShape {
            length: Some(dec!(10)),
            width: Some(dec!(10.0)),
            height: Some(dec!(10)),
            ..shape()
        };
        let second = engine.get_rates(&explicit_dims).await.unwrap();

        assert!(second.from_cache);
        assert_eq!(second.rates, first.rates);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let clock = ManualClock::default();
        let (engine, calls) = engine(RateFetch::ok(vec![rate("ups", "ups_ground", dec!(12))]), &clock);

        engine.get_rates(&shape()).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));
        let again = engine.get_rates(&shape()).await.unwrap();

        assert!(!again.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let clock = ManualClock::default();
        let (engine, calls) = engine(RateFetch::ok(vec![rate("ups", "ups_ground", dec!(12))]), &clock);

        engine.get_rates(&shape()).await.unwrap();
        engine.refresh(&shape()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_fields_fail_without_calling_source() {
        let clock = ManualClock::default();
        let (engine, calls) = engine(RateFetch::ok(Vec::new()), &clock);
        let shape = ShipmentShape {
            from_zip: Some("94102".into()),
            ..Default::default()
        };

        match engine.get_rates(&shape).await {
            Err(ShipError::IncompleteShipmentData(missing)) => {
                assert_eq!(missing, vec!["to_zip", "weight"]);
            }
            other => panic!("expected incomplete data, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_failures_are_classified() {
        let clock = ManualClock::default();
        let (timeout, _) = engine(RateFetch::failed("Request Timeout after 30s"), &clock);
        assert!(matches!(
            timeout.get_rates(&shape()).await,
            Err(ShipError::RateSourceTimeout(_))
        ));

        let (broken, _) = engine(RateFetch::failed("invalid carrier id"), &clock);
        assert!(matches!(
            broken.get_rates(&shape()).await,
            Err(ShipError::RateSourceError(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let clock = ManualClock::default();
        let (engine, calls) = engine(RateFetch::ok(vec![rate("globalpost", "gp", dec!(1))]), &clock);

        assert!(matches!(
            engine.get_rates(&shape()).await,
            Err(ShipError::NoRatesAvailable)
        ));
        assert!(engine.get_rates(&shape()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let policy = RatePolicy {
            fetch_timeout: Duration::from_millis(50),
            ..RatePolicy::default()
        };
        let engine = RateEngine::new(
            Box::new(SlowSource),
            Box::new(InMemoryRateCache::new()),
            Arc::new(ManualClock::default()),
            policy,
        );
        assert!(matches!(
            engine.get_rates(&shape()).await,
            Err(ShipError::RateSourceTimeout(_))
        ));
    }
}
