//! Diagnostics collected while reading or writing a container
//!
//! A [`Transaction`] is the sink every codec reports into. Recording an
//! entry also emits a `tracing` event so command-line runs show problems as
//! they happen.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::traits::ParseError;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Information => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// One reported finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Area of the container the finding concerns, e.g. `"JNT1"`
    pub domain: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.domain, self.message)
    }
}

/// Overall outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Complete,
    Failure,
}

/// Diagnostics sink for one read or write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    path: String,
    diagnostics: Vec<Diagnostic>,
    fatal: bool,
}

impl Transaction {
    /// `path` is used only for messages
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn report(&mut self, severity: Severity, domain: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            severity,
            domain: domain.into(),
            message: message.into(),
        };
        match severity {
            Severity::Information => info!(path = %self.path, domain = %diagnostic.domain, "{}", diagnostic.message),
            Severity::Warning => warn!(path = %self.path, domain = %diagnostic.domain, "{}", diagnostic.message),
            Severity::Error => error!(path = %self.path, domain = %diagnostic.domain, "{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn info(&mut self, domain: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Information, domain, message);
    }

    pub fn warn(&mut self, domain: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Warning, domain, message);
    }

    pub fn error(&mut self, domain: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Error, domain, message);
    }

    /// Record a fatal condition that was caught at section level
    pub fn fail(&mut self, domain: impl Into<String>, err: &ParseError) {
        self.fatal = true;
        self.error(domain, err.to_string());
    }

    pub fn state(&self) -> TransactionState {
        if self.fatal || self.has_errors() {
            TransactionState::Failure
        } else {
            TransactionState::Complete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == TransactionState::Complete
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    /// Record findings produced elsewhere, such as model validation.
    /// `strict` raises every finding to an error.
    pub fn absorb(&mut self, findings: impl IntoIterator<Item = Diagnostic>, strict: bool) {
        for finding in findings {
            let severity = if strict { Severity::Error } else { finding.severity };
            self.report(severity, finding.domain, finding.message);
        }
    }

    /// Diagnostics for one domain
    pub fn in_domain<'s>(&'s self, domain: &'s str) -> impl Iterator<Item = &'s Diagnostic> + 's {
        self.diagnostics.iter().filter(move |d| d.domain == domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_keep_transaction_complete() {
        let mut tx = Transaction::new("model.bmd");
        tx.info("INF1", "scaling rule basic");
        tx.warn("JNT1", "joint compression");

        assert_eq!(tx.state(), TransactionState::Complete);
        assert_eq!(tx.count(Severity::Warning), 1);
        assert_eq!(tx.in_domain("JNT1").count(), 1);
    }

    #[test]
    fn test_error_fails_transaction() {
        let mut tx = Transaction::new("model.bmd");
        tx.fail("SHP1", &ParseError::MalformedDisplayList { offset: 0x20, command: 0x08 });

        assert_eq!(tx.state(), TransactionState::Failure);
        assert!(tx.diagnostics()[0].message.contains("0x08"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic {
            severity: Severity::Warning,
            domain: "VTX1".into(),
            message: "trailing bytes".into(),
        };
        assert_eq!(d.to_string(), "[warning] VTX1: trailing bytes");
    }
}
