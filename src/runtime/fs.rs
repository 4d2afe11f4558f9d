//! File system side of [`RealRuntime`].
//!
//! JSON state (settings, download manifest) is written through a sibling
//! `.tmp` file and renamed into place, so a crash mid-write leaves the previous
//! version readable instead of a truncated file.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        ensure_parent(path)?;

        let staging = temp_sibling(path);
        fs::write(&staging, contents)
            .with_context(|| format!("Failed to write {}", staging.display()))?;

        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_impl(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_file_impl(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))
    }

    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Truncates an existing file; missing parent directories are created.
    #[tracing::instrument(skip(self))]
    pub(crate) fn create_file_impl(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        ensure_parent(path)?;
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(std::io::BufWriter::new(file)))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn set_permissions_impl(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to make {} executable", path.display()))?;
        }
        #[cfg(not(unix))]
        let _ = (path, mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::temp_sibling;
    use crate::runtime::{RealRuntime, Runtime};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_temp_sibling_name() {
        assert_eq!(
            temp_sibling(Path::new("/data/settings.json")),
            Path::new("/data/settings.json.tmp")
        );
    }

    #[test]
    fn test_write_replaces_and_leaves_no_staging_file() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("settings.json");

        runtime.write(&file_path, b"{\"a\":1}").unwrap();
        runtime.write(&file_path, b"{}").unwrap();

        assert_eq!(runtime.read_to_string(&file_path).unwrap(), "{}");
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_write_creates_missing_parent() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("P-Stream/downloads/manifest.json");

        runtime.write(&file_path, b"[]").unwrap();
        assert!(runtime.exists(&file_path));
    }

    #[test]
    fn test_copy_and_remove() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("manifest.json");
        runtime.write(&manifest, b"{broken").unwrap();

        let backup = dir.path().join("manifest.json.corrupt-1");
        assert_eq!(runtime.copy(&manifest, &backup).unwrap(), 7);

        runtime.remove_file(&manifest).unwrap();
        assert!(!runtime.exists(&manifest));
        assert!(runtime.exists(&backup));
    }

    #[test]
    fn test_create_file_streams_content() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("p-stream-update/P-Stream-Setup-2.0.0.exe");

        {
            let mut writer = runtime.create_file(&file_path).unwrap();
            writer.write_all(b"MZ installer").unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(runtime.read_to_string(&file_path).unwrap(), "MZ installer");
    }

    #[cfg(unix)]
    #[test]
    fn test_set_permissions_marks_executable() {
        use std::os::unix::fs::PermissionsExt;

        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("P-Stream.AppImage");
        runtime.write(&file_path, b"ELF").unwrap();

        runtime.set_permissions(&file_path, 0o755).unwrap();

        let mode = std::fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_missing_files_are_errors() {
        let runtime = RealRuntime;
        let missing = Path::new("/nonexistent/p-stream/settings.json");

        assert!(runtime.read_to_string(missing).is_err());
        assert!(runtime.remove_file(missing).is_err());
        assert!(!runtime.exists(missing));
    }
}
