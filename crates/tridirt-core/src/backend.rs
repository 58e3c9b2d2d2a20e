use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::watch;
use tracing::info;

use crate::artifacts::{install_archive, InstallSummary};
use crate::cancel::cancel_requested;
use crate::error::UpdateError;
use crate::http::{build_client, Timeouts};
use crate::launch::{exit_code, tool_command};
use crate::probe::probe_last_modified;
use crate::progress::{NoProgress, TransferProgress};
use crate::registry::ToolDescriptor;

/// Everything the orchestrator does that leaves the process: network calls
/// and running another tool.
#[async_trait]
pub trait UpdateBackend: Send + Sync {
    async fn probe(&self, url: &str) -> Result<Option<DateTime<Utc>>, UpdateError>;

    async fn install(&self, url: &str, install_dir: &Path) -> Result<InstallSummary, UpdateError>;

    /// Installs `tool`'s payload by running `via` with `args`.
    async fn delegate_install(
        &self,
        tool: &ToolDescriptor,
        via: &ToolDescriptor,
        args: &[String],
    ) -> Result<(), UpdateError>;
}

pub struct HttpBackend {
    client: Client,
    timeouts: Timeouts,
    progress: Arc<dyn TransferProgress>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl HttpBackend {
    pub fn new() -> Result<Self, UpdateError> {
        Ok(Self {
            client: build_client()?,
            timeouts: Timeouts::default(),
            progress: Arc::new(NoProgress),
            cancel_rx: None,
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }
}

#[async_trait]
impl UpdateBackend for HttpBackend {
    async fn probe(&self, url: &str) -> Result<Option<DateTime<Utc>>, UpdateError> {
        probe_last_modified(&self.client, url, self.timeouts.probe).await
    }

    async fn install(&self, url: &str, install_dir: &Path) -> Result<InstallSummary, UpdateError> {
        install_archive(
            &self.client,
            url,
            install_dir,
            self.timeouts.read,
            self.progress.as_ref(),
            self.cancel_rx.as_ref(),
        )
        .await
    }

    async fn delegate_install(
        &self,
        tool: &ToolDescriptor,
        via: &ToolDescriptor,
        args: &[String],
    ) -> Result<(), UpdateError> {
        info!("Installing {} through {} {}", tool.name, via.name, args.join(" "));
        let failed = |reason: String| UpdateError::DelegateFailed {
            tool: tool.name.clone(),
            via: via.name.clone(),
            reason,
        };
        let mut cmd = tool_command(via, args)?;
        cmd.current_dir(&via.install_dir);
        let status = cmd.status().await.map_err(|e| failed(e.to_string()))?;
        let code = exit_code(status);
        if cancel_requested(self.cancel_rx.as_ref()) {
            return Err(UpdateError::Cancelled);
        }
        if code != 0 {
            return Err(failed(format!("exited with status {code}")));
        }
        Ok(())
    }
}
