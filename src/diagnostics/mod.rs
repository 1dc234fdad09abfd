use crate::span::Span;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Type error: {msg}")]
    Type { msg: String, span: Span },

    /// Raised for unresolved multiplicity parameters. There is no parent-context
    /// leniency for these, so they abort regardless of nesting depth.
    #[error("Execution error: {msg}")]
    Execution { msg: String, span: Span },

    #[error("Scenario error: {msg}")]
    Scenario { msg: String, path: PathBuf },
}

impl CompileError {
    pub fn type_err(msg: impl Into<String>, span: Span) -> Self {
        Self::Type { msg: msg.into(), span }
    }

    pub fn execution(msg: impl Into<String>, span: Span) -> Self {
        Self::Execution { msg: msg.into(), span }
    }

    pub fn scenario(msg: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Scenario { msg: msg.into(), path: path.into() }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Type { msg, .. } | Self::Execution { msg, .. } | Self::Scenario { msg, .. } => msg,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Type { span, .. } | Self::Execution { span, .. } => Some(*span),
            Self::Scenario { .. } => None,
        }
    }

    /// Attach a span to an error raised without one (e.g. from signature mapping).
    pub fn with_span(self, at: Span) -> Self {
        match self {
            Self::Type { msg, span } if span.is_dummy() => Self::Type { msg, span: at },
            Self::Execution { msg, span } if span.is_dummy() => Self::Execution { msg, span: at },
            other => other,
        }
    }
}

/// Render a CompileError with ariadne for nice terminal output.
pub fn render_error(source: &str, _filename: &str, err: &CompileError) {
    use ariadne::{Label, Report, ReportKind, Source};

    match err {
        CompileError::Type { msg, span } | CompileError::Execution { msg, span } => {
            let kind_str = match err {
                CompileError::Type { .. } => "type",
                _ => "execution",
            };
            if source.is_empty() || span.is_dummy() {
                eprintln!("error[{kind_str}]: {msg}");
                return;
            }
            let span = span.clamp(source.len());
            let rendered = Report::build(ReportKind::Error, (), span.start)
                .with_message(format!("{kind_str} error"))
                .with_label(Label::new(span.start..span.end).with_message(msg))
                .finish()
                .eprint(Source::from(source));
            if rendered.is_err() {
                eprintln!("error[{kind_str}]: {msg}");
            }
        }
        CompileError::Scenario { msg, path } => {
            eprintln!("error[scenario]: {msg}");
            eprintln!("  --> {}", path.display());
        }
    }
}
