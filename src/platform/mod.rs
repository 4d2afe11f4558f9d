//! OS-specific side effects behind one capability trait.
//!
//! Each supported OS gets its own [`PlatformShell`] implementation, selected
//! once from the [`Platform`] tag by [`shell_for`]:
//!
//! - Windows runs the NSIS installer silently; the host must quit so the
//!   installer can replace and relaunch it.
//! - macOS opens the disk image for a manual drag-install.
//! - Linux marks the AppImage executable and reveals it in the file manager.

mod linux;
mod macos;
mod windows;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::asset::Platform;
use crate::error::CoreError;
use crate::runtime::Runtime;

pub use linux::LinuxShell;
pub use macos::MacShell;
pub use windows::WindowsShell;

/// What the host has to do after an installer was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The installer runs unattended and relaunches the app; quit now.
    QuitHost,
    /// The user finishes the install by hand; keep running.
    ManualActionRequired,
}

#[cfg_attr(test, mockall::automock)]
pub trait PlatformShell: Send + Sync {
    fn run_installer(&self, path: &Path) -> Result<InstallOutcome>;
    fn reveal_in_file_manager(&self, path: &Path) -> Result<()>;
    fn move_to_trash(&self, path: &Path) -> Result<()>;
}

/// Shell for an OS with no installer story.
pub struct UnsupportedShell {
    os: String,
}

impl UnsupportedShell {
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }

    fn unsupported(&self) -> anyhow::Error {
        CoreError::PlatformUnsupported(self.os.clone()).into()
    }
}

impl PlatformShell for UnsupportedShell {
    fn run_installer(&self, _path: &Path) -> Result<InstallOutcome> {
        Err(self.unsupported())
    }

    fn reveal_in_file_manager(&self, _path: &Path) -> Result<()> {
        Err(self.unsupported())
    }

    fn move_to_trash(&self, _path: &Path) -> Result<()> {
        Err(self.unsupported())
    }
}

/// Selects the shell implementation for `platform`.
pub fn shell_for<R: Runtime + 'static>(
    platform: &Platform,
    runtime: Arc<R>,
) -> Box<dyn PlatformShell> {
    match platform.os.as_str() {
        "windows" | "win32" => Box::new(WindowsShell),
        "macos" | "darwin" => Box::new(MacShell),
        "linux" => Box::new(LinuxShell::new(runtime)),
        other => Box::new(UnsupportedShell::new(other)),
    }
}

/// Spawns a command without waiting for it.
pub(crate) fn spawn_detached(mut command: std::process::Command) -> Result<()> {
    use anyhow::Context;
    use std::process::Stdio;

    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch {}", program))?;
    Ok(())
}

/// Runs a command to completion and fails on a non-zero exit.
pub(crate) fn run_to_completion(mut command: std::process::Command) -> Result<()> {
    use anyhow::{Context, bail};

    let program = command.get_program().to_string_lossy().into_owned();
    let status = command
        .status()
        .with_context(|| format!("Failed to run {}", program))?;
    if !status.success() {
        bail!("{} exited with {}", program, status);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn command_args(command: &std::process::Command) -> Vec<String> {
    command
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_unsupported_platform_fails() {
        let shell = shell_for(
            &Platform::new("freebsd", "x86_64"),
            Arc::new(MockRuntime::new()),
        );

        let err = shell.run_installer(Path::new("/tmp/app.bin")).unwrap_err();
        assert_eq!(
            CoreError::find(&err),
            Some(&CoreError::PlatformUnsupported("freebsd".into()))
        );
        assert!(shell.move_to_trash(Path::new("/tmp/app.bin")).is_err());
        assert!(shell.reveal_in_file_manager(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_run_to_completion_reports_failure() {
        #[cfg(unix)]
        {
            let ok = std::process::Command::new("true");
            assert!(run_to_completion(ok).is_ok());

            let fail = std::process::Command::new("false");
            assert!(run_to_completion(fail).is_err());
        }

        let missing = std::process::Command::new("pstream-no-such-binary");
        assert!(run_to_completion(missing).is_err());
    }
}
