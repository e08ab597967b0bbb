//! CLI configuration for compile defaults.
//!
//! Separate from per-run flags: this holds settings a project wants on
//! every run, such as library search paths.

pub(crate) mod loader;

pub(crate) use loader::load_cli_config;

use serde::Deserialize;
use stencil::CompileOptions;

/// Contents of `.stencil.toml`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CliConfig {
    /// Compiler options (`library-paths`, `max-include-depth`, `keep-artifacts`, ...).
    #[serde(flatten)]
    pub compile: CompileOptions,

    /// Directory that relative `--out` and batch output paths resolve against.
    pub default_output_dir: Option<String>,
}

impl CliConfig {
    /// Compile options with `~` expanded in library paths.
    pub(crate) fn compile_options(&self) -> CompileOptions {
        let mut options = self.compile.clone();
        options.library_paths = options
            .library_paths
            .iter()
            .map(|path| loader::expand_path(&path.to_string_lossy()))
            .collect();
        options
    }
}
