//! Exit codes for the `npsa` CLI.
//!
//! Exit code ranges:
//! - 0-9: Run outcomes (results were written)
//! - 10-19: User/input errors (fix the arguments, config or data)
//! - 20-29: Runtime failures (numerical or I/O)
//! - 30+: Internal errors (bugs, should be reported)

use npsa_common::{Error, ErrorCategory};

/// Exit codes for npsa operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Results written and the convergence criterion was met (or not requested).
    Clean = 0,

    /// Results written but the iteration budget ran out before convergence.
    NotConverged = 1,

    /// Invalid arguments
    ArgsError = 10,

    /// Priors or inference settings missing, malformed or invalid
    ConfigError = 11,

    /// Input files malformed or inconsistent with the declared dimensions
    DataError = 12,

    /// A precision matrix could not be repaired during inference
    NumericalError = 20,

    /// I/O error while reading inputs or writing results
    IoError = 21,

    /// Internal error (bug - please report)
    InternalError = 30,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Results were produced (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::NotConverged)
    }

    /// Codes 10-19: resolvable by changing arguments, config or data.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::NotConverged => "OK_NOT_CONVERGED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DataError => "ERR_DATA",
            ExitCode::NumericalError => "ERR_NUMERICAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }

    /// Map a CLI-facing error onto its exit code.
    pub fn for_error(err: &Error) -> ExitCode {
        match (err.category(), err) {
            (_, Error::NumericalInstability(_)) => ExitCode::NumericalError,
            (ErrorCategory::Config, _) => ExitCode::ConfigError,
            (ErrorCategory::Data, _) => ExitCode::DataError,
            (ErrorCategory::Io, _) => ExitCode::IoError,
            (ErrorCategory::Inference, _) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::NotConverged.is_success());
        assert!(!ExitCode::NotConverged.is_error());
        assert!(ExitCode::DataError.is_user_error());
        assert!(!ExitCode::NumericalError.is_user_error());
        assert!(ExitCode::InternalError.is_error());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::for_error(&Error::InvalidPriors("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::ModelStructure("x".into())),
            ExitCode::DataError
        );
        assert_eq!(
            ExitCode::for_error(&Error::NumericalInstability("x".into())),
            ExitCode::NumericalError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Inference("x".into())),
            ExitCode::InternalError
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro");
        assert_eq!(ExitCode::for_error(&Error::from(io)), ExitCode::IoError);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::DataError.to_string(), "ERR_DATA (12)");
        assert_eq!(i32::from(ExitCode::NotConverged), 1);
    }
}
