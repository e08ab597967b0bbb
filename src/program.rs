//! Program synthesis: scanned tags to an ordered operation list plus the
//! directive-derived compiler state.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::directive::{parse_directive, Attributes, Directive, DirectiveError, PropertyDecl};
use crate::error::TemplateError;
use crate::scanner::{scan, TagKind};

/// Base type used when no configuration directive names one.
pub const DEFAULT_BASE_TYPE: &str = "CodeGenerator.CodeTemplate";
/// Expression language used when no configuration directive names one.
pub const DEFAULT_LANGUAGE: &str = "lua";

/// Namespaces every generated program imports ahead of user imports.
pub const CORE_IMPORTS: [&str; 2] = ["CodeGenerator", "CodeGenerator.Text"];

/// One step of the generation method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Literal text, at most one physical line.
    Literal(String),
    /// Embedded expression whose value is appended to the output.
    Expression(String),
    /// Embedded statements inserted verbatim.
    Block(String),
    /// Template comment; produces nothing.
    Comment(String),
    /// Directive position marker; produces nothing.
    Directive { name: String, attributes: Attributes },
}

impl Operation {
    /// Whether this operation writes to the output when executed.
    pub fn emits_output(&self) -> bool {
        matches!(
            self,
            Operation::Literal(_) | Operation::Expression(_) | Operation::Block(_)
        )
    }
}

/// Settings accumulated from directives during one synthesis pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerState {
    pub language: String,
    pub target_language: String,
    pub base_type: String,
    pub code_behind: Option<PathBuf>,
    pub libraries: Vec<String>,
    pub imports: Vec<String>,
    pub properties: Vec<PropertyDecl>,
}

impl Default for CompilerState {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            target_language: String::new(),
            base_type: DEFAULT_BASE_TYPE.to_string(),
            code_behind: None,
            libraries: Vec::new(),
            imports: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl CompilerState {
    /// Apply one interpreted directive.
    pub fn apply(&mut self, directive: Directive, line: usize) -> Result<(), DirectiveError> {
        match directive {
            Directive::Configuration(config) => {
                if let Some(language) = config.language {
                    self.language = language;
                }
                if let Some(target) = config.target_language {
                    self.target_language = target;
                }
                if let Some(base) = config.base_type {
                    self.base_type = base;
                }
                if config.code_behind.is_some() {
                    self.code_behind = config.code_behind;
                }
            }
            Directive::LibraryReference(name) => push_unique(&mut self.libraries, name),
            Directive::NamespaceImport(namespace) => push_unique(&mut self.imports, namespace),
            Directive::Property(decl) => {
                if self.properties.iter().any(|p| p.name == decl.name) {
                    return Err(DirectiveError::DuplicateProperty {
                        line,
                        name: decl.name,
                    });
                }
                self.properties.push(decl);
            }
            Directive::Unrecognized(name) => {
                warn!(directive = %name, line, "ignoring unrecognized directive");
            }
        }
        Ok(())
    }

    /// Core imports followed by user imports, without repeats.
    pub fn all_imports(&self) -> Vec<String> {
        let mut imports: Vec<String> = CORE_IMPORTS.iter().map(|s| s.to_string()).collect();
        for namespace in &self.imports {
            push_unique(&mut imports, namespace.clone());
        }
        imports
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// A synthesized, not yet serialized, generator program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Unique generated type name (`Generator1`, `Generator2`, ...).
    pub class_name: String,
    pub state: CompilerState,
    pub operations: Vec<Operation>,
    /// Class-level code blocks, inserted verbatim.
    pub members: Vec<String>,
}

/// Walk the template's tags in order and build a [`Program`].
///
/// `text` must already be preprocessed; `members` are the class-level blocks
/// the preprocessor extracted.
pub fn synthesize(
    class_name: impl Into<String>,
    text: &str,
    members: Vec<String>,
) -> Result<Program, TemplateError> {
    let mut state = CompilerState::default();
    let mut operations = Vec::new();

    for tag in scan(text) {
        let tag = tag?;
        match tag.kind {
            TagKind::Literal => push_literal_lines(&mut operations, &tag.literal_text()),
            TagKind::Expression => operations.push(Operation::Expression(tag.text.to_string())),
            TagKind::Block => operations.push(Operation::Block(tag.text.to_string())),
            TagKind::Comment => operations.push(Operation::Comment(tag.text.to_string())),
            TagKind::Directive => {
                let parsed = parse_directive(tag.text, tag.span.line)?;
                let directive = Directive::interpret(&parsed, tag.span.line)?;
                state.apply(directive, tag.span.line)?;
                operations.push(Operation::Directive {
                    name: parsed.name,
                    attributes: parsed.attributes,
                });
            }
        }
    }

    let program = Program {
        class_name: class_name.into(),
        state,
        operations,
        members,
    };
    debug!(
        class = %program.class_name,
        operations = program.operations.len(),
        properties = program.state.properties.len(),
        "synthesized program"
    );
    Ok(program)
}

/// Split literal text into one operation per physical line, terminator included.
fn push_literal_lines(operations: &mut Vec<Operation>, text: &str) {
    operations.extend(
        text.split_inclusive('\n')
            .map(|line| Operation::Literal(line.to_string())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(s: &str) -> Operation {
        Operation::Literal(s.to_string())
    }

    #[test]
    fn test_literals_split_per_line() {
        let program = synthesize("Generator1", "one\ntwo\r\nthree", Vec::new()).unwrap();
        assert_eq!(
            program.operations,
            vec![literal("one\n"), literal("two\r\n"), literal("three")]
        );
    }

    #[test]
    fn test_operations_keep_source_order() {
        let source = "Hi <%= Name %>!\n<% for i = 1, 2 do %>x<% end %><%-- c --%>";
        let program = synthesize("Generator1", source, Vec::new()).unwrap();
        assert_eq!(
            program.operations,
            vec![
                literal("Hi "),
                Operation::Expression(" Name ".to_string()),
                literal("!\n"),
                Operation::Block(" for i = 1, 2 do ".to_string()),
                literal("x"),
                Operation::Block(" end ".to_string()),
                Operation::Comment(" c ".to_string()),
            ]
        );
    }

    #[test]
    fn test_directives_update_state() {
        let source = concat!(
            "<%@ CodeTemplate Language=\"Lua\" TargetLanguage=\"SQL\" Inherits=\"My.Base\" %>",
            "<%@ Assembly Name=\"helpers\" %>",
            "<%@ Assembly Name=\"helpers\" %>",
            "<%@ Import Namespace=\"My.Utilities\" %>",
            "<%@ Property Name=\"Table\" Type=\"Table\" %>",
            "<%@ property-declaration name=\"Prefix\" type=\"string\" %>",
        );
        let program = synthesize("Generator1", source, Vec::new()).unwrap();
        let state = &program.state;
        assert_eq!(state.language, "Lua");
        assert_eq!(state.target_language, "SQL");
        assert_eq!(state.base_type, "My.Base");
        assert_eq!(state.libraries, vec!["helpers"]);
        assert_eq!(
            state.all_imports(),
            vec!["CodeGenerator", "CodeGenerator.Text", "My.Utilities"]
        );
        let names: Vec<_> = state.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Table", "Prefix"]);
        assert_eq!(program.operations.len(), 6);
        assert!(program.operations.iter().all(|op| !op.emits_output()));
    }

    #[test]
    fn test_defaults_without_configuration() {
        let program = synthesize("Generator7", "text", Vec::new()).unwrap();
        assert_eq!(program.class_name, "Generator7");
        assert_eq!(program.state, CompilerState::default());
        assert_eq!(program.state.base_type, DEFAULT_BASE_TYPE);
    }

    #[test]
    fn test_missing_type_is_directive_error() {
        let err = synthesize(
            "Generator1",
            "X\n<%@ property-declaration name=\"Foo\" %>\n",
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Directive(DirectiveError::MissingAttribute { line: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_property_is_rejected() {
        let source = "<%@ Property Name=\"A\" Type=\"int\" %><%@ Property Name=\"A\" Type=\"string\" %>";
        let err = synthesize("Generator1", source, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Directive(DirectiveError::DuplicateProperty { .. })
        ));
    }

    #[test]
    fn test_malformed_directive_is_parse_error() {
        let err = synthesize("Generator1", "<%@ Property Name=Foo %>", Vec::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));
    }
}
