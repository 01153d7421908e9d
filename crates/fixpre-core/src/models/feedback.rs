use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier of a server-side feedback job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
    /// Anything the client does not recognise
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Feedback as returned by the server. The structure is server-defined, so
/// the payload is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackReport(pub Value);

impl FeedbackReport {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.get("status")
            .and_then(|status| serde_json::from_value(status.clone()).ok())
    }
}
