//! Client configuration

use std::time::Duration;

use serde::Deserialize;

/// Tunables for a [`TransactionalClient`](crate::TransactionalClient)
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Largest encoded execute payload accepted by `execute`
    pub max_frame_bytes: usize,
    /// Bound on `execute_blocking`'s wait for the prepare phase (`None` = unbounded)
    pub prepare_timeout_millis: Option<u64>,
    /// Default bound for `PreparedOperation::await_default_final_outcome`
    pub final_outcome_timeout_millis: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
            prepare_timeout_millis: None,
            final_outcome_timeout_millis: 300_000,
        }
    }
}

impl ClientConfig {
    /// `prepare_timeout_millis` as a `Duration`
    pub fn prepare_timeout(&self) -> Option<Duration> {
        self.prepare_timeout_millis.map(Duration::from_millis)
    }

    /// `final_outcome_timeout_millis` as a `Duration`
    pub fn final_outcome_timeout(&self) -> Duration {
        Duration::from_millis(self.final_outcome_timeout_millis)
    }
}
