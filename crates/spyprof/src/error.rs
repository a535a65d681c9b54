use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Profiler already running in this process")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Signal setup failed: {0}")]
    Signal(String),

    #[error("Missing debug info in {path}. Recompile with `debug = true` in Cargo.toml")]
    MissingDebugInfo { path: String },

    #[error("Symbol resolution error: {0}")]
    SymbolResolution(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const MISSING_DEBUG_INFO: i32 = 5;
    pub const DATABASE_ERROR: i32 = 6;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingDebugInfo { .. } => exit_code::MISSING_DEBUG_INFO,
            Error::Database(_) | Error::Snapshot(_) => exit_code::DATABASE_ERROR,
            Error::InvalidConfig(_) => exit_code::INVALID_ARGUMENTS,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Build a `Signal` error from the current `errno`
    pub(crate) fn last_os(what: &str) -> Self {
        Error::Signal(format!("{}: {}", what, std::io::Error::last_os_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            Error::InvalidConfig("rate".into()).exit_code(),
            exit_code::INVALID_ARGUMENTS
        );
        assert_eq!(
            Error::MissingDebugInfo { path: "a".into() }.exit_code(),
            exit_code::MISSING_DEBUG_INFO
        );
        assert_eq!(Error::AlreadyRunning.exit_code(), exit_code::GENERAL_ERROR);
    }
}
