//! The compilation pipeline: preprocess, synthesize, optimize, emit, compile.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::CompileOptions;
use crate::directive::PropertyDecl;
use crate::emit::{render_program, Language};
use crate::error::TemplateError;
use crate::optimize::suppress_blank_lines;
use crate::preprocess::preprocess;
use crate::program::{synthesize, Program};
use crate::registry::CompilerRegistry;
use crate::toolchain::{
    compile_chunk, compile_reference, library_global, numbered_listing, resolve_library,
    CompileReport, Diagnostic, ReferenceBinding, ReferenceUnit, CODE_LIBRARY, CODE_SYNTAX,
    CODE_UNRESOLVED_LIBRARY,
};

/// Result of submitting a template to the toolchain.
#[derive(Debug)]
pub enum CompileOutcome {
    Compiled(CompiledUnit),
    Failed(CompileReport),
}

impl CompileOutcome {
    pub fn is_compiled(&self) -> bool {
        matches!(self, CompileOutcome::Compiled(_))
    }

    pub fn into_result(self) -> Result<CompiledUnit, CompileReport> {
        match self {
            CompileOutcome::Compiled(unit) => Ok(unit),
            CompileOutcome::Failed(report) => Err(report),
        }
    }
}

/// A successfully compiled template and its on-disk artifacts.
#[derive(Debug)]
pub struct CompiledUnit {
    pub(crate) class_name: String,
    pub(crate) source: String,
    pub(crate) properties: Vec<PropertyDecl>,
    pub(crate) references: Vec<Arc<ReferenceUnit>>,
    pub(crate) artifacts: TempDir,
    pub(crate) keep_artifacts: bool,
}

impl CompiledUnit {
    /// Generated type name, unique per registry.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Synthesized Lua source.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn listing(&self) -> String {
        numbered_listing(&self.source)
    }

    pub fn properties(&self) -> &[PropertyDecl] {
        &self.properties
    }

    pub fn references(&self) -> &[Arc<ReferenceUnit>] {
        &self.references
    }

    pub fn artifact_dir(&self) -> &Path {
        self.artifacts.path()
    }

    /// `GeneratorN.lua` inside the artifact directory.
    pub fn source_path(&self) -> PathBuf {
        self.artifacts.path().join(format!("{}.lua", self.class_name))
    }

    /// `GeneratorN.luac` inside the artifact directory.
    pub fn bytecode_path(&self) -> PathBuf {
        self.artifacts.path().join(format!("{}.luac", self.class_name))
    }
}

/// Compiles templates against a shared [`CompilerRegistry`].
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    registry: Arc<CompilerRegistry>,
    options: CompileOptions,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl TemplateCompiler {
    /// A compiler with its own fresh registry.
    pub fn new(options: CompileOptions) -> Self {
        Self::with_registry(Arc::new(CompilerRegistry::new()), options)
    }

    pub fn with_registry(registry: Arc<CompilerRegistry>, options: CompileOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<CompilerRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Build the optimized program for template text without compiling it.
    pub fn synthesize(&self, source: &str) -> Result<Program, TemplateError> {
        self.synthesize_in(source, self.options.include_root())
    }

    /// Compile template text. Includes, libraries and code-behind resolve
    /// against the configured include root.
    pub fn compile(&self, source: &str) -> Result<CompileOutcome, TemplateError> {
        self.compile_in(source, self.options.include_root())
    }

    /// Compile a template file. Includes, libraries and code-behind resolve
    /// against the file's directory.
    pub fn compile_file(&self, path: &Path) -> Result<CompileOutcome, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        debug!(path = %path.display(), "compiling template file");
        self.compile_in(&source, root)
    }

    fn synthesize_in(&self, source: &str, root: &Path) -> Result<Program, TemplateError> {
        let preprocessed = preprocess(source, root, self.options.max_include_depth)?;
        let class_name = self.registry.next_class_name();
        let mut program = synthesize(class_name, &preprocessed.text, preprocessed.class_blocks)?;
        suppress_blank_lines(&mut program.operations);
        Ok(program)
    }

    fn compile_in(&self, source: &str, root: &Path) -> Result<CompileOutcome, TemplateError> {
        let program = self.synthesize_in(source, root)?;
        let state = &program.state;
        let language: Language = state
            .language
            .parse()
            .map_err(|_| TemplateError::UnsupportedLanguage(state.language.clone()))?;
        let lua_source = render_program(&program, language)?;
        let chunk_name = format!("{}.lua", program.class_name);

        let mut diagnostics = Vec::new();
        let mut references = Vec::new();

        for library in &state.libraries {
            match resolve_library(library, &self.options.library_paths, root) {
                Some(path) => {
                    let binding = ReferenceBinding::Global(library_global(&path));
                    match compile_reference(&path, binding, CODE_LIBRARY) {
                        Ok(unit) => references.push(Arc::new(unit)),
                        Err(diagnostic) => diagnostics.push(diagnostic),
                    }
                }
                None => diagnostics.push(Diagnostic::new(
                    &chunk_name,
                    0,
                    CODE_UNRESOLVED_LIBRARY,
                    format!("library '{library}' could not be found"),
                )),
            }
        }

        if let Some(code_behind) = &state.code_behind {
            match self.registry.code_behind(&root.join(code_behind)) {
                Ok(unit) => references.push(unit),
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }

        let bytecode = match compile_chunk(&lua_source, &chunk_name) {
            Ok(bytecode) => Some(bytecode),
            Err(err) => {
                diagnostics.push(Diagnostic::from_lua_error(&err, &chunk_name, CODE_SYNTAX));
                None
            }
        };

        let bytecode = match bytecode {
            Some(bytecode) if diagnostics.is_empty() => bytecode,
            _ => {
                let report = CompileReport {
                    class_name: program.class_name.clone(),
                    diagnostics,
                    source: lua_source,
                };
                warn!(class = %report.class_name, errors = report.diagnostics.len(), "compilation failed");
                return Ok(CompileOutcome::Failed(report));
            }
        };

        let artifacts = write_artifacts(&program.class_name, &lua_source, &bytecode)
            .map_err(TemplateError::Artifacts)?;
        if self.options.debug {
            info!(class = %program.class_name, "generated source:\n{}", numbered_listing(&lua_source));
        }
        info!(
            class = %program.class_name,
            references = references.len(),
            artifacts = %artifacts.path().display(),
            "compiled template"
        );

        Ok(CompileOutcome::Compiled(CompiledUnit {
            class_name: program.class_name.clone(),
            source: lua_source,
            properties: state.properties.clone(),
            references,
            artifacts,
            keep_artifacts: self.options.keep_artifacts,
        }))
    }
}

fn write_artifacts(class_name: &str, source: &str, bytecode: &[u8]) -> std::io::Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("stencil-").tempdir()?;
    std::fs::write(dir.path().join(format!("{class_name}.lua")), source)?;
    std::fs::write(dir.path().join(format!("{class_name}.luac")), bytecode)?;
    Ok(dir)
}
