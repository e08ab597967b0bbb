//! Command handlers for the stencil CLI.
//!
//! Both commands share a [`Session`]: one compiler (and registry) per
//! process plus the flags that decide how units are compiled and reported.

pub(crate) mod batch;
pub(crate) mod generate;

pub(crate) use batch::handle_batch_command;
pub(crate) use generate::handle_generate_command;

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use stencil::{CompileOptions, CompileOutcome, PropertySet, Runner, TemplateCompiler};

use crate::cli_config::CliConfig;
use crate::output;
use crate::RunArgs;

#[derive(Debug)]
pub(crate) struct Session {
    compiler: TemplateCompiler,
    debug: bool,
    output_dir: Option<PathBuf>,
    written: HashSet<PathBuf>,
}

impl Session {
    pub(crate) fn new(args: &RunArgs, config: &CliConfig) -> Self {
        let options = CompileOptions {
            debug: args.debug || config.compile.debug,
            keep_artifacts: args.keep_temp_files || config.compile.keep_artifacts,
            ..config.compile_options()
        };
        Self {
            compiler: TemplateCompiler::new(options),
            debug: args.debug,
            output_dir: config.default_output_dir.as_deref().map(PathBuf::from),
            written: HashSet::new(),
        }
    }

    /// Compile a template file and load it. Compile failures print the
    /// full report and become an error.
    pub(crate) fn load(&self, template: &Path) -> anyhow::Result<Runner> {
        let outcome = self
            .compiler
            .compile_file(template)
            .with_context(|| format!("cannot compile '{}'", template.display()))?;
        let unit = match outcome {
            CompileOutcome::Compiled(unit) => unit,
            CompileOutcome::Failed(report) => {
                output::compile_report(&report);
                bail!("compilation of '{}' failed", template.display());
            }
        };
        if self.debug {
            output::listing(unit.class_name(), &unit.listing());
        }
        Runner::new(unit).with_context(|| format!("cannot load '{}'", template.display()))
    }

    /// Write generated text to `out`, or stdout when there is none.
    ///
    /// The first write to a path in this session truncates it, later
    /// writes append.
    pub(crate) fn write(&mut self, text: &str, out: Option<&Path>) -> anyhow::Result<()> {
        let Some(out) = out else {
            return output::generated(text).context("cannot write generated text to stdout");
        };
        let path = match &self.output_dir {
            Some(dir) if out.is_relative() => dir.join(out),
            _ => out.to_path_buf(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("cannot create output directory '{}'", parent.display())
            })?;
        }
        let first = self.written.insert(path.clone());
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(first)
            .append(!first)
            .open(&path)
            .with_context(|| format!("cannot open output file '{}'", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("cannot write output file '{}'", path.display()))?;
        output::success(format!("Generated {}", path.display()));
        Ok(())
    }
}

/// Properties from `--properties` then `--property`, in that order.
pub(crate) fn base_properties(args: &RunArgs) -> anyhow::Result<PropertySet> {
    let mut set = match &args.properties {
        Some(path) => {
            let xml = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read properties file '{}'", path.display()))?;
            PropertySet::parse(&xml)
                .with_context(|| format!("invalid properties file '{}'", path.display()))?
        }
        None => PropertySet::new(),
    };
    for (name, value) in &args.property {
        set.push(name.as_str(), value);
    }
    Ok(set)
}
