//! Immutable views of all registry families.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::Distribution;

/// A regular expression that must match a whole name.
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a pattern. It is anchored at both ends.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether the whole name matches.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The pattern as given.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for NamePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamePattern").field(&self.source).finish()
    }
}

/// Point-in-time or per-tick view of counters, metrics, labels and gauges.
///
/// A snapshot owns its maps; later registry activity never shows through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    counters: HashMap<String, i64>,
    metrics: HashMap<String, Distribution>,
    labels: HashMap<String, String>,
    gauges: HashMap<String, f64>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Snapshot {
    /// Assemble a snapshot covering `[start, end]`.
    pub fn new(
        counters: HashMap<String, i64>,
        metrics: HashMap<String, Distribution>,
        labels: HashMap<String, String>,
        gauges: HashMap<String, f64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            counters,
            metrics,
            labels,
            gauges,
            start,
            end,
        }
    }

    /// A snapshot with no entries covering an empty window at `at`.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self::new(
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            at,
            at,
        )
    }

    /// Counter values by name.
    pub fn counters(&self) -> &HashMap<String, i64> {
        &self.counters
    }

    /// Metric distributions by name.
    pub fn metrics(&self) -> &HashMap<String, Distribution> {
        &self.metrics
    }

    /// Label values by name.
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Gauge readings by name.
    pub fn gauges(&self) -> &HashMap<String, f64> {
        &self.gauges
    }

    /// Start of the covered window.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the covered window.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the covered window.
    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Check whether every family is empty.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.metrics.is_empty()
            && self.labels.is_empty()
            && self.gauges.is_empty()
    }

    /// Keep only entries whose names match the pattern.
    pub fn filter(&self, pattern: &NamePattern) -> Snapshot {
        self.retain_names(|name| pattern.matches(name))
    }

    /// Drop entries whose names match the pattern.
    pub fn filter_out(&self, pattern: &NamePattern) -> Snapshot {
        self.retain_names(|name| !pattern.matches(name))
    }

    fn retain_names(&self, keep: impl Fn(&str) -> bool) -> Snapshot {
        fn select<V: Clone>(map: &HashMap<String, V>, keep: &dyn Fn(&str) -> bool) -> HashMap<String, V> {
            map.iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        }

        Snapshot {
            counters: select(&self.counters, &keep),
            metrics: select(&self.metrics, &keep),
            labels: select(&self.labels, &keep),
            gauges: select(&self.gauges, &keep),
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot[{} .. {}] counters={} metrics={} labels={} gauges={}",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.counters.len(),
            self.metrics.len(),
            self.labels.len(),
            self.gauges.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Histogram;
    use pretty_assertions::assert_eq;

    fn sample() -> Snapshot {
        let start = Utc::now();
        let end = start + TimeDelta::seconds(10);
        Snapshot::new(
            HashMap::from([
                ("http.requests".to_string(), 10),
                ("http.errors".to_string(), 2),
                ("db.queries".to_string(), 7),
            ]),
            HashMap::from([(
                "http.latency".to_string(),
                Distribution::from(Histogram::from_values([5, 10])),
            )]),
            HashMap::from([("db.host".to_string(), "primary".to_string())]),
            HashMap::from([("http.inflight".to_string(), 3.0)]),
            start,
            end,
        )
    }

    #[test]
    fn test_name_pattern_is_anchored() {
        let pattern = NamePattern::new("http\\..*").unwrap();
        assert!(pattern.matches("http.requests"));
        assert!(!pattern.matches("xhttp.requests"));
        assert!(!NamePattern::new("http").unwrap().matches("http.requests"));
        assert_eq!(pattern.as_str(), "http\\..*");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(NamePattern::new("("), Err(Error::InvalidPattern(_))));
        assert!("[a-z]+".parse::<NamePattern>().is_ok());
    }

    #[test]
    fn test_filter() {
        let snap = sample();
        let http = snap.filter(&NamePattern::new("http\\..*").unwrap());

        let mut counters: Vec<_> = http.counters().keys().cloned().collect();
        counters.sort();
        assert_eq!(counters, vec!["http.errors", "http.requests"]);
        assert!(http.metrics().contains_key("http.latency"));
        assert!(http.labels().is_empty());
        assert_eq!(http.gauges().get("http.inflight"), Some(&3.0));
        assert_eq!(http.span(), snap.span());
    }

    #[test]
    fn test_filter_out() {
        let snap = sample();
        let rest = snap.filter_out(&NamePattern::new("http\\..*").unwrap());

        assert_eq!(rest.counters(), &HashMap::from([("db.queries".to_string(), 7)]));
        assert!(rest.metrics().is_empty());
        assert_eq!(rest.labels().len(), 1);
        assert!(rest.gauges().is_empty());
        assert_eq!(rest.start(), snap.start());
    }

    #[test]
    fn test_filter_leaves_original_untouched() {
        let snap = sample();
        let _ = snap.filter(&NamePattern::new("nothing").unwrap());
        assert_eq!(snap.counters().len(), 3);
    }

    #[test]
    fn test_span_and_empty() {
        let snap = sample();
        assert_eq!(snap.span(), TimeDelta::seconds(10));
        assert!(!snap.is_empty());

        let empty = Snapshot::empty(Utc::now());
        assert!(empty.is_empty());
        assert_eq!(empty.span(), TimeDelta::zero());
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["counters"]["http.requests"], 10);
        assert_eq!(json["labels"]["db.host"], "primary");
        assert_eq!(json["metrics"]["http.latency"]["count"], 2.0);
        assert!(json["start"].is_string());
    }
}
