//! Error taxonomy shared by the updater, the relay and the download manager.
//!
//! Errors travel as `anyhow::Error`; the typed [`CoreError`] is attached at the
//! point where the failure is classified and recovered later with
//! [`CoreError::find`] when a caller needs to pick a user-facing message.

/// Classified failures that callers branch on.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// DNS, connect, timeout, redirect-loop or 5xx failures
    Network(String),
    /// HTTP 404, or no usable release/asset
    NotFound(String),
    /// HTTP 401/403/429
    Forbidden(String),
    /// Malformed JSON from the release API or a corrupted local file
    Parse(String),
    /// Malformed relay request, rule, version string or download request
    Validation(String),
    /// Installer launch on an unrecognized OS
    PlatformUnsupported(String),
    /// Other client errors that won't succeed on retry
    ClientError(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Network(msg) => write!(f, "Network error: {}", msg),
            CoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CoreError::Forbidden(msg) => write!(f, "Access denied: {}", msg),
            CoreError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CoreError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            CoreError::PlatformUnsupported(platform) => {
                write!(f, "Unsupported platform: {}", platform)
            }
            CoreError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    /// Finds the classified error anywhere in an anyhow chain.
    pub fn find(error: &anyhow::Error) -> Option<&CoreError> {
        // downcast_ref also sees a CoreError attached with .context()
        error
            .downcast_ref::<CoreError>()
            .or_else(|| error.chain().find_map(|e| e.downcast_ref::<CoreError>()))
    }

    /// Returns true when the failure means the machine could not reach the server.
    pub fn is_connectivity_failure(error: &anyhow::Error) -> bool {
        if matches!(CoreError::find(error), Some(CoreError::Network(_))) {
            return true;
        }

        error
            .chain()
            .filter_map(|e| e.downcast_ref::<reqwest::Error>())
            .any(|e| e.is_connect() || e.is_timeout())
    }

    /// Message shown to the user after a manual update check fails.
    pub fn user_message(error: &anyhow::Error) -> String {
        if Self::is_connectivity_failure(error) {
            return "Network error. Please check your internet connection.".to_string();
        }

        match CoreError::find(error) {
            Some(CoreError::NotFound(_)) => {
                "Update server not found. Make sure releases exist on GitHub.".to_string()
            }
            Some(CoreError::Forbidden(_)) => {
                "Update server access denied. The repository may be private or requires authentication."
                    .to_string()
            }
            _ => format!("Update check failed: {}", error),
        }
    }
}
