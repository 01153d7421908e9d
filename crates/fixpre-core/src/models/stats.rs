use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dashboard summary for the signed-in user. Missing or null figures read
/// as zero through the accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DashboardStats {
    #[serde(default)]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub total_presentations: Option<u64>,
    #[serde(default)]
    pub platform_average_score: Option<f64>,
    /// Fields this client does not model
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl DashboardStats {
    pub fn average_score(&self) -> f64 {
        self.average_score.unwrap_or(0.0)
    }

    pub fn total_presentations(&self) -> u64 {
        self.total_presentations.unwrap_or(0)
    }

    pub fn platform_average_score(&self) -> f64 {
        self.platform_average_score.unwrap_or(0.0)
    }
}
