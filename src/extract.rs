//! Picks the target metric out of a collection pass
use log::warn;

use crate::collector::MetricRecord;

/// Outcome of looking up the target metric
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The record was found and its field is numeric
    Found(f64),
    /// The record was found but its field is absent or not numeric
    Malformed { reason: String },
    /// No record carries the target name
    Missing,
}

impl Extraction {
    /// Value to persist; zero unless the metric was found
    pub fn value(&self) -> f64 {
        match self {
            Extraction::Found(v) => *v,
            Extraction::Malformed { .. } | Extraction::Missing => 0.0,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }
}

/// Scan `records` for the first one named `metric` and read `field` from it
///
/// Only the first matching record is considered, even if a later one has a
/// usable value.
pub fn extract(records: &[MetricRecord], metric: &str, field: &str) -> Extraction {
    let Some(record) = records.iter().find(|r| r.name == metric) else {
        warn!("Metric '{}' not found among {} records", metric, records.len());
        return Extraction::Missing;
    };

    match record.field(field) {
        Some(value) => match value.as_f64() {
            Some(v) => Extraction::Found(v),
            None => {
                let reason = format!("'{}' field is a {}, not a number", field, value.type_name());
                warn!("Metric '{}' found but {}", metric, reason);
                Extraction::Malformed { reason }
            }
        },
        None => {
            let reason = format!("'{}' field is absent", field);
            warn!("Metric '{}' found but {}", metric, reason);
            Extraction::Malformed { reason }
        }
    }
}
