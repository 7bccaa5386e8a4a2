use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{process::Command, sync::watch};

use crate::error::DashMetaResult;

/// Anything that can tell whether the stream producing the base manifest is still running.
pub trait StreamLiveness: Send + Sync {
    fn is_alive(&self) -> bool;
}

impl StreamLiveness for AtomicBool {
    fn is_alive(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<L> StreamLiveness for Arc<L>
where
    L: StreamLiveness + ?Sized,
{
    fn is_alive(&self) -> bool {
        self.as_ref().is_alive()
    }
}

/// The command line of the transcoder.
#[derive(Debug, Clone)]
pub struct TranscoderCommand {
    program: Option<PathBuf>,
    args: Vec<OsString>,
}

impl TranscoderCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: Some(program.into()),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// ffmpeg listening on `ingest_url` and writing a live DASH stream to `manifest_path`.
    ///
    /// The ffmpeg executable is looked up in `PATH` unless set with [TranscoderCommand::with_program].
    pub fn ffmpeg_dash(ingest_url: &str, manifest_path: impl AsRef<Path>) -> Self {
        let mut args: Vec<OsString> = [
            "-listen", "1", "-i", ingest_url,
            "-c:v", "libx264", "-preset", "veryfast", "-tune", "zerolatency", "-g", "12",
            "-c:a", "aac", "-ar", "48000", "-b:a", "96k",
            "-keyint_min", "30", "-sc_threshold", "0",
            "-use_template", "1", "-use_timeline", "1",
            "-window_size", "5", "-extra_window_size", "10",
            "-streaming", "1", "-seg_duration", "2", "-frag_duration", "1",
            "-f", "dash", "-live", "1",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(manifest_path.as_ref().as_os_str().to_os_string());

        Self {
            program: None,
            args,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn resolve_program(&self) -> DashMetaResult<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => Ok(which::which("ffmpeg")?),
        }
    }

    fn display(&self, program: &Path) -> String {
        std::iter::once(program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// The process exited, with its exit code if it had one.
    Exited(Option<i32>),
    /// The process could not be started.
    FailedToStart(String),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// Launches the transcoder once and reports its liveness.
///
/// A failed launch or a crashed process is logged and not restarted.
pub struct ProcessSupervisor {
    state: watch::Receiver<ProcessState>,
}

impl ProcessSupervisor {
    /// Start `command`. Must be called within a tokio runtime.
    pub fn spawn(command: TranscoderCommand) -> Self {
        let (sender, receiver) = watch::channel(ProcessState::Running);

        let child = command.resolve_program().and_then(|program| {
            tracing::info!("Starting transcoder: {}", command.display(&program));
            Ok(Command::new(program)
                .args(command.args())
                .stdin(Stdio::null())
                .spawn()?)
        });

        match child {
            Ok(mut child) => {
                tokio::spawn(async move {
                    let state = match child.wait().await {
                        Ok(status) if status.success() => {
                            tracing::info!("Transcoder exited with {status}");
                            ProcessState::Exited(status.code())
                        }
                        Ok(status) => {
                            tracing::error!("Transcoder exited with {status}");
                            ProcessState::Exited(status.code())
                        }
                        Err(e) => {
                            tracing::error!("Failed to wait for transcoder: {e}");
                            ProcessState::Exited(None)
                        }
                    };
                    sender.send_replace(state);
                });
            }
            Err(e) => {
                tracing::error!("Failed to start transcoder: {e}");
                sender.send_replace(ProcessState::FailedToStart(e.to_string()));
            }
        }

        Self { state: receiver }
    }

    pub fn is_alive(&self) -> bool {
        self.state.borrow().is_running()
    }

    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Wait until the process is no longer running and return its final state.
    pub async fn wait(&self) -> ProcessState {
        let mut state = self.state.clone();
        let final_state = match state.wait_for(|s| !s.is_running()).await {
            Ok(s) => s.clone(),
            // the watcher task is gone without reporting, nothing is running anymore
            Err(_) => ProcessState::Exited(None),
        };
        final_state
    }
}

impl StreamLiveness for ProcessSupervisor {
    fn is_alive(&self) -> bool {
        ProcessSupervisor::is_alive(self)
    }
}
