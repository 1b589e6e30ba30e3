use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_SYNTAX: &str = "RSC-ERR-SYNTAX";
pub const ERR_DIRECTIVE_CONFLICT: &str = "RSC-ERR-DIRECTIVE-CONFLICT";
pub const ERR_DEFAULT_EXPORT: &str = "RSC-ERR-DEFAULT-EXPORT";
pub const ERR_EXPORT_LOCAL: &str = "RSC-ERR-EXPORT-LOCAL";
pub const ERR_ANONYMOUS_ACTION: &str = "RSC-ERR-ANONYMOUS-ACTION";
pub const ERR_IO: &str = "RSC-ERR-IO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformErrorKind {
    /// Reported by the parser. Never produced by the transform itself.
    Syntax,
    DirectiveConflict,
    DefaultExport,
    ExportLocal,
    AnonymousAction,
    Io,
}

impl TransformErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            TransformErrorKind::Syntax => ERR_SYNTAX,
            TransformErrorKind::DirectiveConflict => ERR_DIRECTIVE_CONFLICT,
            TransformErrorKind::DefaultExport => ERR_DEFAULT_EXPORT,
            TransformErrorKind::ExportLocal => ERR_EXPORT_LOCAL,
            TransformErrorKind::AnonymousAction => ERR_ANONYMOUS_ACTION,
            TransformErrorKind::Io => ERR_IO,
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            TransformErrorKind::Syntax => "Fix the syntax error before the boundary transform runs.",
            TransformErrorKind::DirectiveConflict => {
                "A module may use \"use client\" or \"use server\", never both."
            }
            TransformErrorKind::DefaultExport => {
                "Server modules must use named exports so every action has a public name."
            }
            TransformErrorKind::ExportLocal => {
                "Export a named local binding so the registration call can reference it."
            }
            TransformErrorKind::AnonymousAction => "Give the server action function a name.",
            TransformErrorKind::Io => "Check that the sidecar path is writable.",
        }
    }
}

/// Fatal error for one file. The build pipeline receives it unchanged.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("[{}] {message} ({file})", .kind.code())]
pub struct TransformError {
    pub kind: TransformErrorKind,
    pub message: String,
    pub file: String,
    pub hints: Vec<String>,
}

impl TransformError {
    pub fn new(kind: TransformErrorKind, message: impl Into<String>, file: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            file: file.to_string(),
            hints: vec![kind.guidance().to_string()],
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn syntax(message: impl Into<String>, file: &str) -> Self {
        Self::new(TransformErrorKind::Syntax, message, file)
    }

    pub fn conflict(message: impl Into<String>, file: &str) -> Self {
        Self::new(TransformErrorKind::DirectiveConflict, message, file)
    }

    pub fn default_export(file: &str) -> Self {
        Self::new(
            TransformErrorKind::DefaultExport,
            "Cannot use default export with 'use server' at module scope.",
            file,
        )
    }

    pub fn missing_local(exported: &str, file: &str) -> Self {
        Self::new(
            TransformErrorKind::ExportLocal,
            format!("local name does not exist for export {}", exported),
            file,
        )
    }

    pub fn anonymous_action(file: &str) -> Self {
        Self::new(
            TransformErrorKind::AnonymousAction,
            "Expected a function with an id",
            file,
        )
    }

    pub fn io(err: std::io::Error, file: &str) -> Self {
        Self::new(TransformErrorKind::Io, err.to_string(), file)
    }
}

pub type TransformResult<T> = Result<T, TransformError>;
