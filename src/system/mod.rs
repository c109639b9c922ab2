//! Host power and display control
//!
//! Exposed to the HTTP layer as the [`SystemActions`] capability so tests
//! (and hosts that must never power off) can swap in their own.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

const UNIX_SHUTDOWN_COMMAND: &str = "/usr/sbin/shutdown now";
const UNIX_REBOOT_COMMAND: &str = "/usr/sbin/reboot";
const WIN_SHUTDOWN_COMMAND: &str = "shutdown /s /t 1";
const WIN_REBOOT_COMMAND: &str = "shutdown /r /t 1";

/// Action named in `POST /api/v1/computer/{action}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputerAction {
    Shutdown,
    Reboot,
    Quit,
    DisableDisplay,
    EnableDisplay,
}

impl ComputerAction {
    /// Playback is stopped first so the player can persist its state
    pub fn stops_playback(self) -> bool {
        matches!(self, Self::Shutdown | Self::Reboot | Self::Quit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
            Self::Quit => "quit",
            Self::DisableDisplay => "disable-display",
            Self::EnableDisplay => "enable-display",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid action")]
pub struct InvalidAction;

impl FromStr for ComputerAction {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shutdown" => Ok(Self::Shutdown),
            "reboot" => Ok(Self::Reboot),
            "quit" => Ok(Self::Quit),
            "disable-display" => Ok(Self::DisableDisplay),
            "enable-display" => Ok(Self::EnableDisplay),
            _ => Err(InvalidAction),
        }
    }
}

impl fmt::Display for ComputerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SystemActions: Send + Sync + 'static {
    async fn shutdown(&self) -> anyhow::Result<()>;
    async fn reboot(&self) -> anyhow::Result<()>;
    async fn display_off(&self) -> anyhow::Result<()>;
    async fn display_on(&self) -> anyhow::Result<()>;
}

pub type SharedSystem = Arc<dyn SystemActions>;

/// Desktop environment facts that decide which display commands work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Desktop {
    /// Lowercased `XDG_CURRENT_DESKTOP`
    pub desktop: String,
    /// Lowercased `XDG_SESSION_TYPE`
    pub session: String,
}

impl Desktop {
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .map(|v| v.to_lowercase())
                .unwrap_or_default()
        };
        Self {
            desktop: read("XDG_CURRENT_DESKTOP"),
            session: read("XDG_SESSION_TYPE"),
        }
    }

    pub fn display_off_command(&self) -> &'static str {
        if self.desktop.contains("kde") {
            "/bin/sleep 1 && /bin/dbus-send --session --print-reply --dest=org.kde.kglobalaccel /component/org_kde_powerdevil org.kde.kglobalaccel.Component.invokeShortcut string:'Turn Off Screen'"
        } else if self.desktop.contains("gnome") {
            "dbus-send --session --dest=org.gnome.ScreenSaver --type=method_call /org/gnome/ScreenSaver org.gnome.ScreenSaver.SetActive boolean:true"
        } else if self.session == "x11" {
            "sleep 0.5 && xset dpms force off"
        } else {
            "xset dpms force off"
        }
    }

    pub fn display_on_command(&self) -> &'static str {
        match self.session.as_str() {
            // Wayland needs simulated input through the ydotool wrapper
            "wayland" => "sudo /usr/local/bin/ydotool-wake",
            "x11" => "xset dpms force on",
            _ => "xset dpms force on 2>/dev/null || xdotool mousemove 0 0",
        }
    }
}

/// Runs the platform's power and DPMS commands through the shell
pub struct ShellSystemActions {
    desktop: Desktop,
}

impl ShellSystemActions {
    pub fn new(desktop: Desktop) -> Self {
        Self { desktop }
    }

    pub fn from_env() -> Self {
        Self::new(Desktop::from_env())
    }

    async fn run(&self, what: &str, command: &str) -> anyhow::Result<()> {
        info!("Executing {} command: {}", what, command);
        let output = shell(command).output().await?;
        if !output.stdout.is_empty() {
            debug!("{} stdout: {}", what, String::from_utf8_lossy(&output.stdout));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} failed ({}): {}", what, output.status, stderr.trim());
            anyhow::bail!("{} command exited with {}", what, output.status);
        }
        Ok(())
    }
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[async_trait]
impl SystemActions for ShellSystemActions {
    async fn shutdown(&self) -> anyhow::Result<()> {
        let command = if cfg!(windows) {
            WIN_SHUTDOWN_COMMAND
        } else {
            UNIX_SHUTDOWN_COMMAND
        };
        self.run("shutdown", command).await
    }

    async fn reboot(&self) -> anyhow::Result<()> {
        let command = if cfg!(windows) {
            WIN_REBOOT_COMMAND
        } else {
            UNIX_REBOOT_COMMAND
        };
        self.run("reboot", command).await
    }

    async fn display_off(&self) -> anyhow::Result<()> {
        if cfg!(windows) {
            debug!("Display control is not supported on Windows");
            return Ok(());
        }
        self.run("display off", self.desktop.display_off_command())
            .await
    }

    async fn display_on(&self) -> anyhow::Result<()> {
        if cfg!(windows) {
            debug!("Display control is not supported on Windows");
            return Ok(());
        }
        self.run("display on", self.desktop.display_on_command())
            .await
    }
}
