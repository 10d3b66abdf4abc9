//! Per-line assembly errors.
//!
//! The reference assembler throws a single exception type carrying a
//! message, a severity, and an optional "skip forward to this closing
//! pseudo-op" instruction. Per the "replace exceptions with a
//! result-carrying return and an explicit skip-target field" design note,
//! that becomes a plain `Result<T, AssemblyError>` here: the pass driver
//! inspects `skip_to` on an `Err` and, when present, advances the source
//! stream past the matching closer instead of aborting the pass.

use crate::opcodes::PseudoOp;
use std::fmt;

/// Two severities only, matching the exception type the reference
/// assembler actually throws (not the older three-severity variant it
/// superseded).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyError {
    pub message: String,
    pub severity: Severity,
    /// Set when the caller should fast-forward the source stream past the
    /// next matching closing pseudo-op (`ENDSUB`, `ENDMACRO`) rather than
    /// simply moving to the next line.
    pub skip_to: Option<PseudoOp>,
}

impl AssemblyError {
    pub fn error(message: impl Into<String>) -> Self {
        AssemblyError {
            message: message.into(),
            severity: Severity::Error,
            skip_to: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        AssemblyError {
            message: message.into(),
            severity: Severity::Warning,
            skip_to: None,
        }
    }

    pub fn skip_to(mut self, target: PseudoOp) -> Self {
        self.skip_to = Some(target);
        self
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AssemblyError {}

impl From<std::io::Error> for AssemblyError {
    fn from(err: std::io::Error) -> AssemblyError {
        AssemblyError::error(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// A location-qualified record of one raised error, as accumulated by the
/// pass driver's de-duplicating error log (spec error-dedup key: file,
/// line, macro name/line, message, severity).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoggedError {
    pub file: String,
    pub line: u32,
    pub macro_name: Option<String>,
    pub macro_line: Option<u32>,
    pub message: String,
    pub severity: Severity,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skip_to_attaches_target() {
        let err = AssemblyError::error("bad").skip_to(PseudoOp::EndSub);
        assert_eq!(err.skip_to, Some(PseudoOp::EndSub));
        assert_eq!(err.severity, Severity::Error);
    }

    #[test]
    fn warning_has_no_default_skip_target() {
        let err = AssemblyError::warning("heads up");
        assert_eq!(err.skip_to, None);
        assert_eq!(err.severity, Severity::Warning);
    }
}
