//! One-shot readers for the dashboard statistics and the feedback history.
//!
//! Both endpoints require a token. Without one the reader fails at once and
//! sends nothing.

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, Failure, Host};
use crate::models::{DashboardStats, FeedbackReport};

/// An authenticated GET endpoint and the messages used when it fails
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub path: &'static str,
    pub missing_token: &'static str,
    pub fallback: &'static str,
}

pub const HISTORY: Endpoint = Endpoint {
    path: "/feedback/history",
    missing_token: "You are not logged in",
    fallback: "Could not fetch history",
};

pub const DASHBOARD_STATS: Endpoint = Endpoint {
    path: "/dashboard/stats",
    missing_token: "No authentication token found",
    fallback: "Failed to fetch dashboard stats",
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReaderState<T> {
    pub loading: bool,
    pub data: Option<T>,
    pub error: Option<Failure>,
}

impl<T> Default for ReaderState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: None,
            error: None,
        }
    }
}

pub struct Reader<T> {
    api: ApiClient,
    endpoint: Endpoint,
    state: watch::Sender<ReaderState<T>>,
}

pub type HistoryReader = Reader<Vec<FeedbackReport>>;
pub type StatsReader = Reader<DashboardStats>;

impl<T> Reader<T>
where
    T: DeserializeOwned + Clone,
{
    pub fn new(api: ApiClient, endpoint: Endpoint) -> Self {
        let (state, _) = watch::channel(ReaderState::default());
        Self {
            api,
            endpoint,
            state,
        }
    }

    pub fn state(&self) -> ReaderState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReaderState<T>> {
        self.state.subscribe()
    }

    /// Fetch the endpoint once. `loading` is cleared whatever the outcome.
    pub async fn fetch(&self) -> Result<T, ApiError> {
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self.fetch_inner().await;

        self.state.send_modify(|state| {
            state.loading = false;
            match &result {
                Ok(data) => state.data = Some(data.clone()),
                Err(e) => state.error = Some(Failure::from(e)),
            }
        });
        if let Err(e) = &result {
            warn!(path = self.endpoint.path, error = %e, "Fetch failed");
        }
        result
    }

    async fn fetch_inner(&self) -> Result<T, ApiError> {
        if !self.api.session().is_logged_in() {
            return Err(ApiError::Unauthenticated(
                self.endpoint.missing_token.to_string(),
            ));
        }
        let response = self.api.get(Host::Api, self.endpoint.path, &[]).await?;
        if !response.is_success() {
            return Err(response.error_with_detail(&["message"], self.endpoint.fallback));
        }
        let data = response.json()?;
        debug!(path = self.endpoint.path, "Fetched");
        Ok(data)
    }
}

impl HistoryReader {
    pub fn history(api: ApiClient) -> Self {
        Self::new(api, HISTORY)
    }
}

impl StatsReader {
    pub fn dashboard_stats(api: ApiClient) -> Self {
        Self::new(api, DASHBOARD_STATS)
    }
}

/// Derived figures, zero until a snapshot is loaded
impl ReaderState<DashboardStats> {
    pub fn average_score(&self) -> f64 {
        self.data.as_ref().map_or(0.0, DashboardStats::average_score)
    }

    pub fn total_presentations(&self) -> u64 {
        self.data.as_ref().map_or(0, DashboardStats::total_presentations)
    }

    pub fn platform_average_score(&self) -> f64 {
        self.data
            .as_ref()
            .map_or(0.0, DashboardStats::platform_average_score)
    }
}
