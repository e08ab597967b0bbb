//! Lua toolchain: compiles chunks to bytecode and turns compiler errors into
//! diagnostics.

use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::LazyLock;

use mlua::Lua;
use regex::Regex;

static LUA_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(?P<file>[^:\n]+):(?P<line>\d+):\s*(?P<message>.*)$")
        .expect("lua error pattern is valid")
});

/// Diagnostic code for syntax errors in the generated program.
pub const CODE_SYNTAX: &str = "syntax";
/// Diagnostic code for library references that resolve to no file.
pub const CODE_UNRESOLVED_LIBRARY: &str = "unresolved-library";
/// Diagnostic code for errors inside a referenced library.
pub const CODE_LIBRARY: &str = "library";
/// Diagnostic code for errors in a code-behind file.
pub const CODE_CODE_BEHIND: &str = "code-behind";

/// One compiler error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(file: impl Into<String>, line: usize, code: &str, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column: 0,
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Build a diagnostic from a Lua compiler error, using `file` when the
    /// message carries no location.
    pub fn from_lua_error(error: &mlua::Error, file: &str, code: &str) -> Self {
        let text = match error {
            mlua::Error::SyntaxError { message, .. } => message.clone(),
            other => other.to_string(),
        };
        match LUA_ERROR_RE.captures(&text) {
            Some(caps) => Diagnostic::new(
                &caps["file"],
                caps["line"].parse().unwrap_or(0),
                code,
                caps["message"].trim(),
            ),
            None => Diagnostic::new(file, 0, code, text.trim()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}): error {}: {}",
            self.file, self.line, self.column, self.code, self.message
        )
    }
}

/// A failed compilation: the ordered diagnostics plus the source submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub class_name: String,
    pub diagnostics: Vec<Diagnostic>,
    pub source: String,
}

impl CompileReport {
    /// `Build Failed: N Errors, 0 Warnings`.
    pub fn summary(&self) -> String {
        format!("Build Failed: {} Errors, 0 Warnings", self.diagnostics.len())
    }

    /// The generated source with line numbers.
    pub fn listing(&self) -> String {
        numbered_listing(&self.source)
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Prefix every line with its 1-based number.
pub fn numbered_listing(source: &str) -> String {
    let width = source.lines().count().max(1).to_string().len();
    source
        .lines()
        .enumerate()
        .map(|(index, line)| format!("{:>width$}: {line}\n", index + 1))
        .collect()
}

/// How a reference's return value is exposed once it has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceBinding {
    /// A returned table becomes the named global.
    Global(String),
    /// Every key of a returned table becomes a global.
    Spread,
}

/// A compiled library or code-behind chunk loaded ahead of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceUnit {
    pub name: String,
    pub path: PathBuf,
    pub bytecode: Vec<u8>,
    pub binding: ReferenceBinding,
}

/// Compile Lua source to bytecode. `chunk_name` is the file name reported in
/// errors.
pub fn compile_chunk(source: &str, chunk_name: &str) -> Result<Vec<u8>, mlua::Error> {
    let lua = Lua::new();
    let function = lua
        .load(source)
        .set_name(format!("@{chunk_name}"))
        .into_function()?;
    Ok(function.dump(false))
}

/// Compile a source file into a reference unit, or a diagnostic.
pub fn compile_reference(
    path: &Path,
    binding: ReferenceBinding,
    code: &str,
) -> Result<ReferenceUnit, Diagnostic> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let source = std::fs::read_to_string(path)
        .map_err(|e| Diagnostic::new(&name, 0, code, format!("cannot read '{}': {e}", path.display())))?;
    let bytecode = compile_chunk(&source, &name)
        .map_err(|e| Diagnostic::from_lua_error(&e, &name, code))?;
    Ok(ReferenceUnit {
        name,
        path: path.to_path_buf(),
        bytecode,
        binding,
    })
}

/// Find the file for a `library-reference` name.
///
/// A name ending in `.lua` or containing a path separator is a path relative
/// to `include_root`. Otherwise the dotted module name maps to `a/b.lua`,
/// searched in `library_paths` then `include_root`.
pub fn resolve_library(name: &str, library_paths: &[PathBuf], include_root: &Path) -> Option<PathBuf> {
    if name.ends_with(".lua") || name.contains('/') || name.contains(MAIN_SEPARATOR) {
        let path = include_root.join(name);
        return path.is_file().then_some(path);
    }

    let relative = format!("{}.lua", name.replace('.', "/"));
    library_paths
        .iter()
        .map(PathBuf::as_path)
        .chain(std::iter::once(include_root))
        .map(|dir| dir.join(&relative))
        .find(|candidate| candidate.is_file())
}

/// Global name a library's returned table is bound to: its file stem.
pub fn library_global(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compile_chunk_produces_bytecode() {
        let bytecode = compile_chunk("return 1 + 1", "Generator1.lua").unwrap();
        assert!(bytecode.starts_with(b"\x1bLua"));
    }

    #[test]
    fn test_syntax_error_becomes_diagnostic() {
        let err = compile_chunk("local x = \nreturn )", "Generator9.lua").unwrap_err();
        let diagnostic = Diagnostic::from_lua_error(&err, "Generator9.lua", CODE_SYNTAX);
        assert_eq!(diagnostic.file, "Generator9.lua");
        assert_eq!(diagnostic.line, 2);
        assert_eq!(diagnostic.column, 0);
        assert_eq!(diagnostic.code, "syntax");
        assert!(!diagnostic.message.is_empty());
        assert!(diagnostic
            .to_string()
            .starts_with("Generator9.lua(2, 0): error syntax: "));
    }

    #[test]
    fn test_report_summary_and_listing() {
        let report = CompileReport {
            class_name: "Generator1".to_string(),
            diagnostics: vec![
                Diagnostic::new("a.lua", 1, CODE_SYNTAX, "one"),
                Diagnostic::new("a.lua", 2, CODE_SYNTAX, "two"),
            ],
            source: "first\nsecond\n".to_string(),
        };
        assert_eq!(report.summary(), "Build Failed: 2 Errors, 0 Warnings");
        assert_eq!(report.listing(), "1: first\n2: second\n");
        assert!(report.to_string().ends_with("Build Failed: 2 Errors, 0 Warnings"));
    }

    #[test]
    fn test_resolve_library_paths() {
        let libs = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(libs.path().join("text")).unwrap();
        std::fs::write(libs.path().join("text/format.lua"), "return {}").unwrap();
        std::fs::write(root.path().join("local.lua"), "return {}").unwrap();

        let found = resolve_library("text.format", &[libs.path().to_path_buf()], root.path());
        assert_eq!(found, Some(libs.path().join("text/format.lua")));
        assert_eq!(
            resolve_library("local.lua", &[], root.path()),
            Some(root.path().join("local.lua"))
        );
        assert_eq!(
            resolve_library("local", &[libs.path().to_path_buf()], root.path()),
            Some(root.path().join("local.lua"))
        );
        assert_eq!(resolve_library("missing", &[], root.path()), None);
        assert_eq!(library_global(Path::new("lib/text/format.lua")), "format");
    }

    #[test]
    fn test_compile_reference_reports_library_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.lua");
        std::fs::write(&path, "return {").unwrap();
        let diagnostic = compile_reference(&path, ReferenceBinding::Spread, CODE_LIBRARY).unwrap_err();
        assert_eq!(diagnostic.file, "broken.lua");
        assert_eq!(diagnostic.code, "library");

        let missing = compile_reference(&dir.path().join("none.lua"), ReferenceBinding::Spread, CODE_CODE_BEHIND)
            .unwrap_err();
        assert_eq!(missing.code, "code-behind");
        assert_eq!(missing.line, 0);
    }
}
