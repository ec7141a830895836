use chrono::{SecondsFormat, Utc};
use ctg_rs::ConditionedRecording;
use serde::Serialize;
use uuid::Uuid;

/// JSON envelope written for every conditioned recording.
#[derive(Serialize)]
pub struct ConditioningReport<'a> {
    pub id: Uuid,
    pub source: &'a str,
    pub created_at: String,
    /// Rate of the loaded recording; `result.sample_rate` is the rate after decimation
    pub source_sample_rate: f64,
    pub valid_fraction: f64,
    pub result: &'a ConditionedRecording,
}

impl<'a> ConditioningReport<'a> {
    pub fn new(source: &'a str, source_sample_rate: f64, result: &'a ConditionedRecording) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source_sample_rate,
            valid_fraction: result.valid_fraction(),
            result,
        }
    }
}
