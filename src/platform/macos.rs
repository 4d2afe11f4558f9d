use anyhow::Result;
use log::info;
use std::path::Path;
use std::process::Command;

use super::{InstallOutcome, PlatformShell, run_to_completion, spawn_detached};

pub struct MacShell;

impl MacShell {
    pub(crate) fn open_command(path: &Path) -> Command {
        let mut command = Command::new("open");
        command.arg(path);
        command
    }

    pub(crate) fn reveal_command(path: &Path) -> Command {
        let mut command = Command::new("open");
        command.arg("-R").arg(path);
        command
    }

    pub(crate) fn trash_command(path: &Path) -> Command {
        let escaped = path
            .display()
            .to_string()
            .replace('\\', "\\\\")
            .replace('"', "\\\"");

        let mut command = Command::new("osascript");
        command.args([
            "-e",
            &format!(
                "tell application \"Finder\" to delete POSIX file \"{}\"",
                escaped
            ),
        ]);
        command
    }
}

impl PlatformShell for MacShell {
    #[tracing::instrument(skip(self))]
    fn run_installer(&self, path: &Path) -> Result<InstallOutcome> {
        info!("Opening disk image {:?} for manual install", path);
        spawn_detached(Self::open_command(path))?;
        Ok(InstallOutcome::ManualActionRequired)
    }

    fn reveal_in_file_manager(&self, path: &Path) -> Result<()> {
        spawn_detached(Self::reveal_command(path))
    }

    fn move_to_trash(&self, path: &Path) -> Result<()> {
        run_to_completion(Self::trash_command(path))
    }
}
