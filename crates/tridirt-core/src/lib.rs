//! Keeps locally installed tools current and launches them.

pub mod artifacts;
pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod freshness;
pub mod http;
pub mod launch;
pub mod orchestrator;
pub mod probe;
pub mod progress;
pub mod registry;
pub mod timestamp;

#[cfg(test)]
mod test_support;

pub use backend::{HttpBackend, UpdateBackend};
pub use config::LauncherConfig;
pub use error::UpdateError;
pub use orchestrator::{AssumeYes, InstallPrompt, LaunchPlan, Orchestrator, SyncPhase, SyncReport};
pub use registry::{Registry, ToolDescriptor, TRID, TRID_DEFS};
