//! Starting an installed tool with forwarded arguments.

use std::{
    ffi::{OsStr, OsString},
    io,
    process::ExitStatus,
};

use tokio::{process::Command, sync::watch};
use tracing::debug;

use crate::backend::UpdateBackend;
use crate::cancel::cancelled;
use crate::error::{UpdateError, EXIT_FAILURE};
use crate::orchestrator::{InstallPrompt, Orchestrator};
use crate::registry::ToolDescriptor;

/// Command line that runs `tool` with `args`, through its interpreter when it
/// has one. Arguments are passed as given, including `--` and non-UTF-8 bytes.
pub fn tool_command<S: AsRef<OsStr>>(
    tool: &ToolDescriptor,
    args: &[S],
) -> Result<Command, UpdateError> {
    let launch = tool
        .launch
        .as_ref()
        .ok_or_else(|| UpdateError::NotLaunchable(tool.name.clone()))?;
    let mut cmd = match launch.interpreter.as_deref() {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&tool.executable_path);
            cmd
        }
        None => Command::new(&tool.executable_path),
    };
    cmd.args(args);
    Ok(cmd)
}

/// Runs `tool` with inherited stdio and returns its exit code.
pub async fn run_tool(tool: &ToolDescriptor, args: &[OsString]) -> Result<i32, UpdateError> {
    let mut cmd = tool_command(tool, args)?;
    debug!("Running {:?}", cmd.as_std());
    let status = cmd.status().await.map_err(|e| spawn_error(tool, e))?;
    Ok(exit_code(status))
}

/// Syncs `tool_name` and its dependents, then runs it with `args`. Returns the
/// tool's exit code.
///
/// `cancel_rx` only covers the sync. Once the tool runs, an interrupt reaches
/// it directly and its exit code is what comes back.
pub async fn run<B: UpdateBackend>(
    orchestrator: &Orchestrator<B>,
    tool_name: &str,
    args: &[OsString],
    prompt: &dyn InstallPrompt,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> Result<i32, UpdateError> {
    let plan = tokio::select! {
        biased;
        _ = cancelled(cancel_rx) => return Err(UpdateError::Cancelled),
        plan = orchestrator.prepare(tool_name, tridirt_util::now_utc(), prompt) => plan?,
    };
    run_tool(&plan.tool, args).await
}

pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_FAILURE
}

fn spawn_error(tool: &ToolDescriptor, err: io::Error) -> UpdateError {
    let program = tool
        .launch
        .as_ref()
        .and_then(|launch| launch.interpreter.clone())
        .unwrap_or_else(|| tool.executable_path.display().to_string());
    UpdateError::Io(io::Error::new(
        err.kind(),
        format!("failed to start {program} for {}: {err}", tool.name),
    ))
}
