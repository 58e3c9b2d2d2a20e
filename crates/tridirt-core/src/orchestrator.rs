//! Per-tool update state machine.
//!
//! For each tool: install it if absent, otherwise decide from its sync state
//! whether a remote check is due, probe, update when the remote copy is newer,
//! and record the sync time. Failures while checking or updating an existing
//! installation are logged and the installed copy is used as is.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::UpdateBackend;
use crate::error::UpdateError;
use crate::freshness::is_check_due;
use crate::registry::{Installer, Registry, ToolDescriptor};
use crate::timestamp::{format_timestamp, read_timestamp, write_timestamp, NEVER_SYNCED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    NotInstalled,
    Installing,
    Checking,
    Updating,
    UpToDate,
    Failed,
}

/// Phases one tool went through during a sync, in order.
#[derive(Clone, Debug)]
pub struct SyncReport {
    pub tool: String,
    pub phases: Vec<SyncPhase>,
}

impl SyncReport {
    fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            phases: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("{}: {:?}", self.tool, phase);
        self.phases.push(phase);
    }

    fn finish(mut self, phase: SyncPhase) -> Self {
        self.enter(phase);
        self
    }

    pub fn outcome(&self) -> Option<SyncPhase> {
        self.phases.last().copied()
    }

    pub fn visited(&self, phase: SyncPhase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Asked before a tool is installed for the first time. `Ok(false)` declines;
/// an interrupted prompt reports `UpdateError::Cancelled`.
pub trait InstallPrompt {
    fn confirm_install(&self, tool: &ToolDescriptor) -> Result<bool, UpdateError>;
}

impl<F> InstallPrompt for F
where
    F: Fn(&ToolDescriptor) -> bool,
{
    fn confirm_install(&self, tool: &ToolDescriptor) -> Result<bool, UpdateError> {
        Ok(self(tool))
    }
}

pub struct AssumeYes;

impl InstallPrompt for AssumeYes {
    fn confirm_install(&self, _tool: &ToolDescriptor) -> Result<bool, UpdateError> {
        Ok(true)
    }
}

/// A tool that is ready to run, plus what syncing it and its dependents did.
#[derive(Clone, Debug)]
pub struct LaunchPlan {
    pub tool: ToolDescriptor,
    pub reports: Vec<SyncReport>,
}

pub struct Orchestrator<B> {
    registry: Registry,
    backend: B,
    offline: bool,
}

impl<B: UpdateBackend> Orchestrator<B> {
    pub fn new(registry: Registry, backend: B) -> Self {
        Self {
            registry,
            backend,
            offline: false,
        }
    }

    /// Never probe for updates. Missing tools are still installed.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Syncs `tool_name`, then every tool that depends on it in registry
    /// order. Only failures that leave nothing to run are returned as errors.
    pub async fn prepare(
        &self,
        tool_name: &str,
        now: DateTime<Utc>,
        prompt: &dyn InstallPrompt,
    ) -> Result<LaunchPlan, UpdateError> {
        let tool = self.registry.lookup(tool_name)?;
        if !tool.is_launchable() {
            return Err(UpdateError::NotLaunchable(tool.name.clone()));
        }

        let mut reports = vec![self.sync_tool(tool, now, prompt).await?];
        for dependent in self.registry.dependents_of(&tool.name) {
            match self.sync_tool(dependent, now, prompt).await {
                Ok(report) => reports.push(report),
                Err(err @ UpdateError::InstallDeclined(_)) => return Err(err),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!("Continuing without {}: {}", dependent.name, err);
                    reports.push(SyncReport::new(&dependent.name).finish(SyncPhase::Failed));
                }
            }
        }

        Ok(LaunchPlan {
            tool: tool.clone(),
            reports,
        })
    }

    pub async fn sync_tool(
        &self,
        tool: &ToolDescriptor,
        now: DateTime<Utc>,
        prompt: &dyn InstallPrompt,
    ) -> Result<SyncReport, UpdateError> {
        let mut report = SyncReport::new(&tool.name);

        if !tool.is_installed() {
            report.enter(SyncPhase::NotInstalled);
            return match &tool.installer {
                Installer::Direct => self.install_direct(tool, now, prompt, report).await,
                Installer::Delegated { via, args } => {
                    self.install_delegated(tool, via, args, now, report).await
                }
            };
        }

        report.enter(SyncPhase::Checking);
        let last_synced = read_timestamp(&tool.state_file_path);

        if self.offline {
            debug!("Offline; skipping update check for {}", tool.name);
            return Ok(report.finish(SyncPhase::UpToDate));
        }
        if !is_check_due(now, last_synced, tool.freshness_interval) {
            debug!(
                "{} last synced {}; no check due",
                tool.name,
                format_timestamp(last_synced)
            );
            return Ok(report.finish(SyncPhase::UpToDate));
        }

        let remote = match self.backend.probe(&tool.download_url).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!("Update check for {} failed: {}", tool.name, err);
                None
            }
        };

        let Some(remote) = remote else {
            info!(
                "Remote timestamp for {} unknown; using the installed copy",
                tool.name
            );
            return Ok(report.finish(SyncPhase::UpToDate));
        };

        if last_synced != NEVER_SYNCED && remote <= last_synced {
            debug!(
                "{} is current (remote {}, synced {})",
                tool.name,
                format_timestamp(remote),
                format_timestamp(last_synced)
            );
            self.record_sync(tool, now);
            return Ok(report.finish(SyncPhase::UpToDate));
        }

        report.enter(SyncPhase::Updating);
        info!("Updating {} (remote copy from {})", tool.name, format_timestamp(remote));
        match self.backend.install(&tool.download_url, &tool.install_dir).await {
            Ok(summary) => {
                info!("Updated {} ({} bytes)", tool.name, summary.bytes);
                self.record_sync(tool, now);
                Ok(report.finish(SyncPhase::UpToDate))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(
                    "Update of {} failed; keeping the installed copy: {}",
                    tool.name, err
                );
                Ok(report.finish(SyncPhase::Failed))
            }
        }
    }

    async fn install_direct(
        &self,
        tool: &ToolDescriptor,
        now: DateTime<Utc>,
        prompt: &dyn InstallPrompt,
        mut report: SyncReport,
    ) -> Result<SyncReport, UpdateError> {
        if !prompt.confirm_install(tool)? {
            return Err(UpdateError::InstallDeclined(tool.name.clone()));
        }

        report.enter(SyncPhase::Installing);
        info!("Installing {} from {}", tool.name, tool.download_url);
        let result = self
            .backend
            .install(&tool.download_url, &tool.install_dir)
            .await;
        let summary = match result {
            Ok(summary) => summary,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                report.enter(SyncPhase::Failed);
                return Err(UpdateError::InstallFailed {
                    tool: tool.name.clone(),
                    source: Box::new(err),
                });
            }
        };

        if !tool.is_installed() {
            report.enter(SyncPhase::Failed);
            return Err(UpdateError::InstallFailed {
                tool: tool.name.clone(),
                source: Box::new(UpdateError::MissingPayload {
                    tool: tool.name.clone(),
                    path: tool.executable_path.clone(),
                }),
            });
        }

        info!("Installed {} ({} bytes)", tool.name, summary.bytes);
        self.record_sync(tool, now);
        Ok(report.finish(SyncPhase::UpToDate))
    }

    async fn install_delegated(
        &self,
        tool: &ToolDescriptor,
        via: &str,
        args: &[String],
        now: DateTime<Utc>,
        mut report: SyncReport,
    ) -> Result<SyncReport, UpdateError> {
        let via = self.registry.lookup(via)?;
        report.enter(SyncPhase::Installing);

        if !via.is_installed() {
            warn!(
                "Cannot install {}: {} is not installed",
                tool.name, via.name
            );
            return Ok(report.finish(SyncPhase::Failed));
        }

        match self.backend.delegate_install(tool, via, args).await {
            Ok(()) if tool.is_installed() => {
                info!("Installed {} through {}", tool.name, via.name);
                self.record_sync(tool, now);
                Ok(report.finish(SyncPhase::UpToDate))
            }
            Ok(()) => {
                warn!(
                    "{} finished but {} is still missing",
                    via.name,
                    tool.executable_path.display()
                );
                Ok(report.finish(SyncPhase::Failed))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!("{}", err);
                Ok(report.finish(SyncPhase::Failed))
            }
        }
    }

    /// A failed write only means the next run checks again.
    fn record_sync(&self, tool: &ToolDescriptor, now: DateTime<Utc>) {
        match write_timestamp(&tool.state_file_path, now) {
            Ok(()) => info!("Recorded {} as synced at {}", tool.name, format_timestamp(now)),
            Err(err) => warn!("{}", err),
        }
    }
}
