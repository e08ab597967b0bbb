//! Errors that stop a compilation before any unit is produced.
//!
//! Compiler diagnostics are not errors: they come back as
//! [`CompileOutcome::Failed`](crate::CompileOutcome::Failed).

use std::path::PathBuf;

use crate::directive::DirectiveError;
use crate::emit::EmitError;
use crate::preprocess::PreprocessError;
use crate::scanner::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Directive(#[from] DirectiveError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("unsupported expression language '{0}'")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("cannot read template '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write compilation artifacts: {0}")]
    Artifacts(#[source] std::io::Error),
}
