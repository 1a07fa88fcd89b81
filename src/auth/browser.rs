//! Opening the authorization page in the user's browser.

use std::fmt;
use std::io;
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Errors from a [`BrowserLauncher`].
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No launcher command is known for this platform.
    #[error("no browser launcher for platform {os}")]
    Unsupported {
        /// `std::env::consts::OS`.
        os: &'static str,
    },

    /// The launcher process could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The launcher program.
        program: &'static str,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The launcher process exited unsuccessfully.
    #[error("{program} exited with {status}")]
    Exited {
        /// The launcher program.
        program: &'static str,
        /// Its exit status.
        status: ExitStatus,
    },

    /// The caller cancelled while the launcher was running.
    #[error("browser launch cancelled")]
    Cancelled,
}

/// Opens a URL for the human to interact with.
#[async_trait]
pub trait BrowserLauncher: Send + Sync + fmt::Debug {
    /// Opens `url`, returning once the launcher has finished.
    async fn open(&self, cancel: &CancellationToken, url: &str) -> Result<(), BrowserError>;
}

/// Launches the platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl SystemBrowser {
    fn command(url: &str) -> Result<(&'static str, Command), BrowserError> {
        let (program, handler) = match std::env::consts::OS {
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => ("xdg-open", None),
            "macos" => ("open", None),
            "windows" => ("rundll32", Some("url.dll,FileProtocolHandler")),
            os => return Err(BrowserError::Unsupported { os }),
        };
        let mut command = Command::new(program);
        command.args(handler).arg(url).kill_on_drop(true);
        Ok((program, command))
    }
}

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    #[instrument(skip_all)]
    async fn open(&self, cancel: &CancellationToken, url: &str) -> Result<(), BrowserError> {
        let (program, mut command) = Self::command(url)?;
        let mut child = command
            .spawn()
            .map_err(|source| BrowserError::Spawn { program, source })?;
        debug!(program, "browser launcher started");

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BrowserError::Cancelled),
            status = child.wait() => status.map_err(|source| BrowserError::Spawn { program, source })?,
        };
        if !status.success() {
            return Err(BrowserError::Exited { program, status });
        }
        Ok(())
    }
}
