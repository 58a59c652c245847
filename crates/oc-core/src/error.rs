//! Error types and status codes for the oxidized-cell session layer

use thiserror::Error;

/// Outcome of a session-level operation or of one execution quantum.
///
/// This is the value that crosses the host boundary, so it stays a plain
/// status code rather than a Rust error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    /// Operation completed normally
    Success,
    /// Core was asked to run before it was initialized
    ErrorNotInitialized,
    /// No loader could handle the program image
    ErrorGetLoader,
    /// Bad or missing program image
    ErrorLoader,
    /// Required firmware or system archives are missing
    ErrorSystemFiles,
    /// Savestate slot is corrupt or incompatible
    ErrorSavestate,
    /// Remote link the machine depends on was dropped
    ErrorExternalLinkDisconnected,
    /// The emulated machine asked to power off
    ShutdownRequested,
    /// Anything else
    ErrorUnknown,
}

impl ResultStatus {
    /// Whether this status is `Success`
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::ErrorNotInitialized => "core not initialized",
            Self::ErrorGetLoader => "no loader for program image",
            Self::ErrorLoader => "failed to load program image",
            Self::ErrorSystemFiles => "missing system files",
            Self::ErrorSavestate => "savestate error",
            Self::ErrorExternalLinkDisconnected => "external link disconnected",
            Self::ShutdownRequested => "shutdown requested",
            Self::ErrorUnknown => "unknown error",
        };
        write!(f, "{}", name)
    }
}

/// Error kinds the host is allowed to see when asked to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreError {
    SystemFiles,
    Savestate,
    ExternalLinkDisconnected,
    Unknown,
}

impl CoreError {
    /// Map a loop result onto the host-visible set. Anything without a
    /// dedicated kind becomes `Unknown`.
    pub fn from_status(status: ResultStatus) -> Self {
        match status {
            ResultStatus::ErrorSystemFiles => Self::SystemFiles,
            ResultStatus::ErrorSavestate => Self::Savestate,
            ResultStatus::ErrorExternalLinkDisconnected => Self::ExternalLinkDisconnected,
            _ => Self::Unknown,
        }
    }

    /// Stable name used in logs and by host bindings
    pub fn name(self) -> &'static str {
        match self {
            Self::SystemFiles => "ErrorSystemFiles",
            Self::Savestate => "ErrorSavestate",
            Self::ExternalLinkDisconnected => "ErrorExternalLinkDisconnected",
            Self::Unknown => "ErrorUnknown",
        }
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for the session layer
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Savestate error: {0}")]
    Savestate(String),

    #[error("Service module error: {0}")]
    Module(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),
}

/// Loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("No program specified")]
    EmptyPath,

    #[error("No loader accepts {0}")]
    Unsupported(String),

    #[error("Invalid program image: {0}")]
    InvalidImage(String),

    #[error("Program is not executable: {0}")]
    NotExecutable(String),
}

impl From<&EmulatorError> for ResultStatus {
    fn from(err: &EmulatorError) -> Self {
        match err {
            EmulatorError::Loader(e) => ResultStatus::from(e),
            EmulatorError::Savestate(_) => ResultStatus::ErrorSavestate,
            _ => ResultStatus::ErrorUnknown,
        }
    }
}

impl From<&LoaderError> for ResultStatus {
    fn from(err: &LoaderError) -> Self {
        match err {
            LoaderError::Unsupported(_) => ResultStatus::ErrorGetLoader,
            _ => ResultStatus::ErrorLoader,
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
