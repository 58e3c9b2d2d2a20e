use std::{
    ffi::OsString,
    io::{self, IsTerminal},
    process::ExitCode,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError};
use tridirt_core::{
    cancel::watch_interrupt, launch, progress::TransferProgress, HttpBackend, InstallPrompt,
    LauncherConfig, Orchestrator, Registry, ToolDescriptor, UpdateError, TRID,
};

/// Runs TrID, installing or refreshing it and its definitions first.
/// Every argument is passed to TrID unchanged.
#[derive(Parser)]
#[command(name = "tridirt", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_parser = clap::value_parser!(OsString)
    )]
    args: Vec<OsString>,
}

/// Arguments to hand to TrID. clap takes a leading `--` as its own
/// separator, so it is put back in front.
fn forwarded_args<I>(argv: I) -> Result<Vec<OsString>, clap::Error>
where
    I: IntoIterator<Item = OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().collect();
    let mut args = Cli::try_parse_from(&argv)?.args;
    if argv.get(1).is_some_and(|first| first == "--") {
        args.insert(0, OsString::from("--"));
    }
    Ok(args)
}

/// Byte progress on stderr for archive downloads.
#[derive(Default)]
struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TransferProgress for BarProgress {
    fn begin(&self, label: &str, total_bytes: Option<u64>) {
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(
                    "{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}",
                ) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::with_template("{spinner:.green} {prefix:.bold.cyan} {bytes}")
                {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        bar.set_prefix(label.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn advance(&self, bytes: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(bytes);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

/// Asks on the terminal before a first install. Without a terminal to ask on,
/// the install goes ahead.
struct ConsolePrompt {
    assume_yes: bool,
}

impl InstallPrompt for ConsolePrompt {
    fn confirm_install(&self, tool: &ToolDescriptor) -> Result<bool, UpdateError> {
        if self.assume_yes || !io::stdin().is_terminal() {
            return Ok(true);
        }
        let answer = Confirm::new(&format!(
            "{} is not installed. Download it into {}?",
            tool.name,
            tool.install_dir.display()
        ))
        .with_default(true)
        .with_help_message(&format!("Source: {}", tool.download_url))
        .prompt();
        match answer {
            Ok(yes) => Ok(yes),
            Err(InquireError::OperationCanceled) => Ok(false),
            Err(InquireError::OperationInterrupted) => Err(UpdateError::Cancelled),
            Err(err) => {
                tracing::warn!("Install prompt failed: {err}");
                Ok(false)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = tridirt_util::init_tracing() {
        eprintln!("tridirt: logging disabled: {err}");
    }
    let args = match forwarded_args(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };

    match run(&args).await {
        Ok(code) => exit_status(code),
        Err(err) => {
            tracing::debug!("{err:?}");
            eprintln!("tridirt: {err}");
            exit_status(err.exit_code())
        }
    }
}

async fn run(args: &[OsString]) -> Result<i32, UpdateError> {
    let config = LauncherConfig::from_env()?;
    tracing::debug!("Install directory {}", config.install_dir.display());
    let registry = Registry::load(&config);

    let cancel_rx = watch_interrupt();
    let mut backend = HttpBackend::new()?.with_cancel(cancel_rx.clone());
    if io::stderr().is_terminal() {
        backend = backend.with_progress(Arc::new(BarProgress::default()));
    }
    let orchestrator = Orchestrator::new(registry, backend).offline(config.offline);
    let prompt = ConsolePrompt {
        assume_yes: config.assume_yes,
    };

    launch::run(&orchestrator, TRID, args, &prompt, Some(cancel_rx)).await
}

fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<OsString> {
        std::iter::once("tridirt")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_forwards_options_and_files() {
        let args = forwarded_args(argv(&["-ae", "--help", "sample.bin"])).unwrap();
        assert_eq!(args, argv(&["-ae", "--help", "sample.bin"])[1..]);
    }

    #[test]
    fn test_keeps_leading_double_dash() {
        let args = forwarded_args(argv(&["--", "-weird-name.bin"])).unwrap();
        assert_eq!(args, argv(&["--", "-weird-name.bin"])[1..]);

        let args = forwarded_args(argv(&["--", "--"])).unwrap();
        assert_eq!(args, argv(&["--", "--"])[1..]);
    }

    #[test]
    fn test_keeps_later_double_dash() {
        let args = forwarded_args(argv(&["-ae", "--", "-x.bin"])).unwrap();
        assert_eq!(args, argv(&["-ae", "--", "-x.bin"])[1..]);
    }

    #[test]
    fn test_no_arguments() {
        assert!(forwarded_args(argv(&[])).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_accepts_non_utf8_file_names() {
        use std::os::unix::ffi::OsStringExt;

        let name = OsString::from_vec(b"sa\xff.bin".to_vec());
        let args = forwarded_args(vec![OsString::from("tridirt"), name.clone()]).unwrap();
        assert_eq!(args, vec![name]);
    }
}
