use crate::span::Span;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Declaration error: {msg}")]
    Declaration { msg: String, span: Span },

    #[error("Resolution error: {msg}")]
    Resolve { msg: String, span: Span },

    #[error("internal compiler error: {msg}")]
    Internal { msg: String, span: Span },

    #[error("Verification failed for '{function}': {msg}")]
    Verify { function: String, msg: String },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },

    #[error("{} errors, first: {}", .0.len(), .0[0])]
    Multiple(Vec<CompileError>),
}

impl CompileError {
    pub fn declaration(msg: impl Into<String>, span: Span) -> Self {
        Self::Declaration { msg: msg.into(), span }
    }

    pub fn resolve(msg: impl Into<String>, span: Span) -> Self {
        Self::Resolve { msg: msg.into(), span }
    }

    pub fn internal(msg: impl Into<String>, span: Span) -> Self {
        Self::Internal { msg: msg.into(), span }
    }

    pub fn verify(function: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Verify { function: function.into(), msg: msg.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    /// Collapse a list of errors: a single error stays as is.
    /// Callers must not pass an empty list.
    pub fn from_many(mut errors: Vec<CompileError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Declaration { span, .. }
            | Self::Resolve { span, .. }
            | Self::Internal { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Render a CompileError with ariadne for nice terminal output.
pub fn render_error(source: &str, err: &CompileError) {
    use ariadne::{Label, Report, ReportKind, Source};

    match err {
        CompileError::Declaration { msg, span }
        | CompileError::Resolve { msg, span }
        | CompileError::Internal { msg, span } => {
            let kind_str = match err {
                CompileError::Declaration { .. } => "declaration error",
                CompileError::Resolve { .. } => "resolution error",
                _ => "internal compiler error",
            };
            let printed = Report::build(ReportKind::Error, (), span.start)
                .with_message(kind_str)
                .with_label(Label::new(span.start..span.end).with_message(msg))
                .finish()
                .eprint(Source::from(source));
            if printed.is_err() {
                eprintln!("error: {err}");
            }
        }
        CompileError::Verify { function, msg } => {
            eprintln!("error[verify]: function '{function}' is malformed");
            eprintln!("{msg}");
        }
        CompileError::Codegen { msg } => {
            eprintln!("error: {msg}");
        }
        CompileError::Config { msg, path } => {
            eprintln!("error[config]: {msg}");
            eprintln!("  --> {}", path.display());
        }
        CompileError::Multiple(errors) => {
            for e in errors {
                render_error(source, e);
            }
        }
    }
}
