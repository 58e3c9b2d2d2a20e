use std::time::Duration;

use reqwest::{redirect, Client};

use crate::error::UpdateError;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest wait for the next chunk of a download body.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_REDIRECTS: usize = 10;

/// Per-request limits applied on top of the client's connect timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub probe: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: PROBE_TIMEOUT,
            read: READ_TIMEOUT,
        }
    }
}

pub fn build_client() -> Result<Client, UpdateError> {
    Client::builder()
        .user_agent(concat!("tridirt/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| UpdateError::NetworkUnavailable(format!("failed to build http client: {e}")))
}
