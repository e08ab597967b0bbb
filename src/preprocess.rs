//! Source expansions that run before tag scanning.
//!
//! 1. File inclusion: `<!-- #include file="PATH" -->` is replaced with the
//!    contents of `PATH`, recursively.
//! 2. Script extraction: `<script runat="template">...</script>` (or
//!    `scope="template"`) regions are cut out of the text and returned as
//!    class-level code blocks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::directive::parse_attributes;

/// Default nesting limit for `#include`.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<!--\s*#include\s+file\s*=\s*"(?P<file>[^"]+)"\s*-->"#)
        .expect("include pattern is valid")
});

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script(?P<attributes>[^>]*)>(?P<body>.*?)</script\s*>")
        .expect("script pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("cannot include '{}': {source}", path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("include nesting exceeds {limit} levels at '{}'", path.display())]
    IncludeDepth { path: PathBuf, limit: usize },
}

/// Template text after both expansions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preprocessed {
    pub text: String,
    /// Bodies of template-scoped script regions, in source order.
    pub class_blocks: Vec<String>,
}

/// Run inclusion then script extraction.
pub fn preprocess(
    source: &str,
    include_root: &Path,
    max_depth: usize,
) -> Result<Preprocessed, PreprocessError> {
    let text = expand_includes(source, include_root, max_depth)?;
    let (text, class_blocks) = extract_scripts(&text);
    debug!(
        bytes = text.len(),
        class_blocks = class_blocks.len(),
        "preprocessed template"
    );
    Ok(Preprocessed { text, class_blocks })
}

/// Replace every include tag with the referenced file's expanded contents.
pub fn expand_includes(
    source: &str,
    include_root: &Path,
    max_depth: usize,
) -> Result<String, PreprocessError> {
    expand_at_depth(source, include_root, max_depth, 0)
}

fn expand_at_depth(
    source: &str,
    root: &Path,
    max_depth: usize,
    depth: usize,
) -> Result<String, PreprocessError> {
    if !INCLUDE_RE.is_match(source) {
        return Ok(source.to_string());
    }

    let mut expanded = String::with_capacity(source.len());
    let mut last = 0;
    for caps in INCLUDE_RE.captures_iter(source) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let path = root.join(&caps["file"]);
        if depth >= max_depth {
            return Err(PreprocessError::IncludeDepth {
                path,
                limit: max_depth,
            });
        }

        let included = std::fs::read_to_string(&path).map_err(|source| {
            PreprocessError::Include {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), depth = depth + 1, "including file");

        expanded.push_str(&source[last..whole.start]);
        expanded.push_str(&expand_at_depth(&included, root, max_depth, depth + 1)?);
        last = whole.end;
    }
    expanded.push_str(&source[last..]);
    Ok(expanded)
}

/// Cut template-scoped script regions out of `source`.
pub fn extract_scripts(source: &str) -> (String, Vec<String>) {
    let mut blocks = Vec::new();
    let text = SCRIPT_RE.replace_all(source, |caps: &Captures<'_>| {
        if is_template_scoped(&caps["attributes"]) {
            blocks.push(caps["body"].to_string());
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    (text.into_owned(), blocks)
}

fn is_template_scoped(attributes: &str) -> bool {
    let Ok(attributes) = parse_attributes(attributes) else {
        return false;
    };
    attributes
        .get_any(&["runat", "scope"])
        .is_some_and(|value| value.eq_ignore_ascii_case("template"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_include_preserves_order() {
        let dir = root_with(&[("b.txt", "B")]);
        let text = expand_includes(r#"A<!--#include file="b.txt"-->C"#, dir.path(), 8).unwrap();
        assert_eq!(text, "ABC");
    }

    #[test]
    fn test_include_spacing_and_case() {
        let dir = root_with(&[("b.txt", "B")]);
        let text =
            expand_includes(r#"A<!-- #INCLUDE file="b.txt" -->C"#, dir.path(), 8).unwrap();
        assert_eq!(text, "ABC");
    }

    #[test]
    fn test_include_is_recursive() {
        let dir = root_with(&[
            ("outer.txt", r#"[<!--#include file="parts/inner.txt"-->]"#),
            ("parts/inner.txt", "inner"),
        ]);
        let text =
            expand_includes(r#"<!--#include file="outer.txt"-->!"#, dir.path(), 8).unwrap();
        assert_eq!(text, "[inner]!");
    }

    #[test]
    fn test_missing_include_reports_path() {
        let dir = root_with(&[]);
        let err = expand_includes(r#"<!--#include file="nope.txt"-->"#, dir.path(), 8)
            .unwrap_err();
        match err {
            PreprocessError::Include { path, .. } => assert!(path.ends_with("nope.txt")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_include_stops_at_depth_limit() {
        let dir = root_with(&[("loop.txt", r#"x<!--#include file="loop.txt"-->"#)]);
        let err = expand_includes(r#"<!--#include file="loop.txt"-->"#, dir.path(), 5)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::IncludeDepth { limit: 5, .. }));
    }

    #[test]
    fn test_template_scoped_scripts_are_extracted() {
        let source = "a<script runat=\"template\">\nfunction helper() end\n</script>b\
                      <script type=\"text/javascript\">keep()</script>\
                      <script scope=\"Template\">x = 1</script>c";
        let (text, blocks) = extract_scripts(source);
        assert_eq!(
            text,
            "ab<script type=\"text/javascript\">keep()</script>c"
        );
        assert_eq!(blocks, vec!["\nfunction helper() end\n", "x = 1"]);
    }

    #[test]
    fn test_malformed_script_attributes_are_left_alone() {
        let source = "<script runat=template>x</script>";
        let (text, blocks) = extract_scripts(source);
        assert_eq!(text, source);
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_preprocess_includes_before_scripts() {
        let dir = root_with(&[("helpers.inc", "<script runat=\"template\">h = 1</script>")]);
        let result = preprocess(
            r#"top<!--#include file="helpers.inc"-->bottom"#,
            dir.path(),
            DEFAULT_MAX_INCLUDE_DEPTH,
        )
        .unwrap();
        assert_eq!(result.text, "topbottom");
        assert_eq!(result.class_blocks, vec!["h = 1"]);
    }
}
