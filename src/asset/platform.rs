/// Operating system and CPU architecture, as reported by `std::env::consts`.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

/// Architecture tags that appear in installer file names.
pub const ARCH_TAGS: [&str; 2] = ["x64", "arm64"];

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was compiled for.
    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Installer file extension published for this OS (lowercase, with dot).
    pub fn installer_extension(&self) -> Option<&'static str> {
        match self.os.as_str() {
            "windows" | "win32" => Some(".exe"),
            "linux" => Some(".appimage"),
            "macos" | "darwin" => Some(".dmg"),
            _ => None,
        }
    }

    /// Tag used in installer names for this architecture.
    pub fn arch_tag(&self) -> Option<&'static str> {
        match self.arch.as_str() {
            "x86_64" | "amd64" | "x64" => Some("x64"),
            "aarch64" | "arm64" => Some("arm64"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
