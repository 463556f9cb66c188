use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Which stage of configuration processing rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Tokenizer or grammar failure.
    Syntax,
    /// The statement parsed but violates a configuration invariant.
    Semantic,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "syntax error",
            DiagnosticKind::Semantic => "semantic error",
        }
    }
}

/// One configuration defect, keyed to its source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 1-based source line.
    pub line: usize,
    /// 1-based column; 0 when the defect spans the whole statement.
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Syntax,
            line,
            column,
            message: message.into(),
        }
    }

    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Semantic,
            line,
            column: 0,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column > 0 {
            write!(
                f,
                "line {}:{}: {}: {}",
                self.line,
                self.column,
                self.kind.as_str(),
                self.message
            )
        } else {
            write!(f, "line {}: {}: {}", self.line, self.kind.as_str(), self.message)
        }
    }
}

/// Everything wrong with a configuration source, in source order.
///
/// A failed compile never installs; the caller keeps whatever set it had.
#[derive(Debug, Clone)]
pub struct DiagnosticList(pub Vec<Diagnostic>);

impl std::error::Error for DiagnosticList {}

impl DiagnosticList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl fmt::Display for DiagnosticList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

/// Crate-level convenience error.
///
/// Resolution outcomes are values (`Resolved`), never errors; this covers
/// configuration and service plumbing only.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration:\n{0}")]
    Config(#[from] DiagnosticList),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown processor {0:?}")]
    UnknownProcessor(String),
}
