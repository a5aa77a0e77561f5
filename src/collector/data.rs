use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::devices::MeasurementFrame;

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>, // serialized as RFC 3339
    pub sequence: u64,
    #[serde(flatten)]
    pub frame: MeasurementFrame,
}

/// Totals returned when a collection run is stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub frames: u64,
    pub transport_errors: u64,
    pub decode_errors: u64,
}
