use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use super::{InstallOutcome, PlatformShell, run_to_completion, spawn_detached};
use crate::runtime::Runtime;

/// Mode applied to a downloaded AppImage.
pub const APPIMAGE_MODE: u32 = 0o755;

pub struct LinuxShell<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> LinuxShell<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    pub(crate) fn reveal_command(path: &Path) -> Command {
        // xdg-open can't select a file, so open the folder that holds it
        let folder = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };
        let mut command = Command::new("xdg-open");
        command.arg(folder);
        command
    }

    pub(crate) fn trash_command(path: &Path) -> Command {
        let mut command = Command::new("gio");
        command.arg("trash").arg(path);
        command
    }
}

impl<R: Runtime> PlatformShell for LinuxShell<R> {
    #[tracing::instrument(skip(self))]
    fn run_installer(&self, path: &Path) -> Result<InstallOutcome> {
        self.runtime
            .set_permissions(path, APPIMAGE_MODE)
            .with_context(|| format!("Failed to mark {:?} executable", path))?;
        info!("AppImage {:?} is ready; revealing it for the user", path);
        self.reveal_in_file_manager(path)?;
        Ok(InstallOutcome::ManualActionRequired)
    }

    fn reveal_in_file_manager(&self, path: &Path) -> Result<()> {
        spawn_detached(Self::reveal_command(path))
    }

    fn move_to_trash(&self, path: &Path) -> Result<()> {
        run_to_completion(Self::trash_command(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::command_args;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    #[test]
    fn test_reveal_command_opens_parent_folder() {
        let command =
            LinuxShell::<MockRuntime>::reveal_command(Path::new("/nonexistent/dl/P-Stream.AppImage"));
        assert_eq!(command.get_program(), "xdg-open");
        assert_eq!(command_args(&command), vec!["/nonexistent/dl"]);
    }

    #[test]
    fn test_trash_command() {
        let command = LinuxShell::<MockRuntime>::trash_command(Path::new("/opt/P-Stream.AppImage"));
        assert_eq!(command.get_program(), "gio");
        assert_eq!(command_args(&command), vec!["trash", "/opt/P-Stream.AppImage"]);
    }

    #[test]
    fn test_run_installer_fails_when_chmod_fails() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_set_permissions()
            .with(eq(PathBuf::from("/tmp/P-Stream.AppImage")), eq(APPIMAGE_MODE))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("permission denied")));

        let shell = LinuxShell::new(Arc::new(runtime));
        let result = shell.run_installer(Path::new("/tmp/P-Stream.AppImage"));

        assert!(result.is_err());
    }
}
