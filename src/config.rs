//! Compile options shared by the library and the CLI config file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::preprocess::DEFAULT_MAX_INCLUDE_DEPTH;

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

/// Options for one [`TemplateCompiler`](crate::TemplateCompiler).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CompileOptions {
    /// Keep the generated source listing on successful compiles too.
    pub debug: bool,

    /// Leave compilation artifacts on disk when the runner is released.
    pub keep_artifacts: bool,

    /// Directories searched for `library-reference` modules.
    pub library_paths: Vec<PathBuf>,

    /// Maximum `#include` nesting. Default: 64.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Base directory for includes, libraries and code-behind files when
    /// compiling template text. Default: the working directory.
    pub include_root: Option<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            debug: false,
            keep_artifacts: false,
            library_paths: Vec::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            include_root: None,
        }
    }
}

impl CompileOptions {
    /// The include root, falling back to `.`.
    pub fn include_root(&self) -> &Path {
        self.include_root.as_deref().unwrap_or_else(|| Path::new("."))
    }
}
