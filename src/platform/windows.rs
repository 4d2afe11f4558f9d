use anyhow::Result;
use log::info;
use std::path::Path;
use std::process::Command;

use super::{InstallOutcome, PlatformShell, run_to_completion, spawn_detached};

/// NSIS silent-install switch.
const SILENT_FLAG: &str = "/S";

pub struct WindowsShell;

impl WindowsShell {
    pub(crate) fn installer_command(path: &Path) -> Command {
        let mut command = Command::new(path);
        command.arg(SILENT_FLAG);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(DETACHED_PROCESS | CREATE_NO_WINDOW);
        }

        command
    }

    pub(crate) fn reveal_command(path: &Path) -> Command {
        let mut command = Command::new("explorer");
        command.arg(format!("/select,{}", path.display()));
        command
    }

    pub(crate) fn trash_command(path: &Path) -> Command {
        let method = if path.is_dir() {
            "DeleteDirectory"
        } else {
            "DeleteFile"
        };
        let escaped = path.display().to_string().replace('\'', "''");

        let mut command = Command::new("powershell");
        command.args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            &format!(
                "Add-Type -AssemblyName Microsoft.VisualBasic; \
                 [Microsoft.VisualBasic.FileIO.FileSystem]::{}('{}', 'OnlyErrorDialogs', 'SendToRecycleBin')",
                method, escaped
            ),
        ]);
        command
    }
}

impl PlatformShell for WindowsShell {
    #[tracing::instrument(skip(self))]
    fn run_installer(&self, path: &Path) -> Result<InstallOutcome> {
        info!("Launching silent installer {:?}", path);
        spawn_detached(Self::installer_command(path))?;
        Ok(InstallOutcome::QuitHost)
    }

    fn reveal_in_file_manager(&self, path: &Path) -> Result<()> {
        // explorer.exe returns 1 even on success, so don't wait on it
        spawn_detached(Self::reveal_command(path))
    }

    fn move_to_trash(&self, path: &Path) -> Result<()> {
        run_to_completion(Self::trash_command(path))
    }
}
