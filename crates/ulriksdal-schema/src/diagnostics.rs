#![forbid(unsafe_code)]

//! Parser and validator diagnostics.

use std::fmt;

use ulriksdal_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// One problem found while parsing or validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Schema or document the problem was found in, when known.
    pub system_id: Option<String>,
    /// `(row, column)`, 1-based.
    pub position: Option<(u32, u32)>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            system_id: None,
            position: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn in_resource(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn at(mut self, pos: roxmltree::TextPos) -> Self {
        self.position = Some((pos.row, pos.col));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system_id) = &self.system_id {
            write!(f, "{system_id}:")?;
        }
        if let Some((row, col)) = self.position {
            write!(f, "{row}:{col}: ")?;
        } else if self.system_id.is_some() {
            f.write_str(" ")?;
        }
        f.write_str(&self.message)
    }
}

/// Receives every diagnostic raised while parsing or validating.
///
/// Returning `Err` stops processing; returning `Ok` continues it.
pub trait ErrorHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic) -> Result<()>;
}

/// Turns every diagnostic, warnings included, into a parse error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailClosed;

impl ErrorHandler for FailClosed {
    fn report(&self, diagnostic: Diagnostic) -> Result<()> {
        tracing::warn!("Parser {} {}", diagnostic.severity, diagnostic);
        Err(Error::Parse(format!("{}: {diagnostic}", diagnostic.severity)))
    }
}
