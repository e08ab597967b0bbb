//! Program serialization to Lua source.
//!
//! The structured [`Program`] is flattened into small view structs that the
//! Askama template in `templates/emit/generator.lua` consumes.

use std::fmt::Write as _;
use std::str::FromStr;

use askama::Template;

use crate::program::{Operation, Program};
use crate::properties::PropertyType;

/// Expression languages the toolchain can compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Lua,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lua" | "lua54" | "lua5.4" => Ok(Language::Lua),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Lua => write!(f, "lua"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to render generator source: {0}")]
    Rendering(String),
}

// =========================================================================
// Template views
// =========================================================================

/// A declared property as the generator template sees it.
#[derive(Debug, Clone)]
pub struct PropertyView {
    pub name: String,
    pub type_name: String,
    pub default_value: &'static str,
    pub metadata: Vec<(String, String)>,
}

impl PropertyView {
    /// Quoted property name.
    pub fn name_literal(&self) -> String {
        lua_string(&self.name)
    }

    /// Quoted backing field name: `_` plus the name with its first letter lowered.
    pub fn field_literal(&self) -> String {
        lua_string(&field_name(&self.name))
    }

    pub fn getter_literal(&self) -> String {
        lua_string(&format!("get_{}", self.name))
    }

    pub fn setter_literal(&self) -> String {
        lua_string(&format!("set_{}", self.name))
    }

    pub fn type_literal(&self) -> String {
        lua_string(&self.type_name)
    }

    /// Metadata attributes as a Lua table constructor body.
    pub fn metadata_fields(&self) -> String {
        self.metadata
            .iter()
            .map(|(key, value)| format!("[{}] = {}", lua_string(key), lua_string(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Template, Debug)]
#[template(path = "emit/generator.lua", escape = "none")]
struct GeneratorTemplate<'a> {
    class_name: &'a str,
    language: Language,
    target_language: String,
    base_type: String,
    imports: Vec<String>,
    properties: Vec<PropertyView>,
    members: &'a [String],
    statements: Vec<String>,
}

/// Render a program as a Lua chunk.
pub fn render_program(program: &Program, language: Language) -> Result<String, EmitError> {
    let state = &program.state;
    let properties = state
        .properties
        .iter()
        .map(|decl| PropertyView {
            name: decl.name.clone(),
            type_name: decl.type_name.clone(),
            default_value: PropertyType::parse(&decl.type_name).lua_default(),
            metadata: decl
                .metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect();

    let template = GeneratorTemplate {
        class_name: &program.class_name,
        language,
        target_language: lua_string(&state.target_language),
        base_type: lua_string(&state.base_type),
        imports: state.all_imports().iter().map(|i| lua_string(i)).collect(),
        properties,
        members: &program.members,
        statements: program.operations.iter().filter_map(statement).collect(),
    };

    template
        .render()
        .map_err(|e| EmitError::Rendering(e.to_string()))
}

/// Lua statement for one operation; `None` for operations that emit nothing.
fn statement(operation: &Operation) -> Option<String> {
    match operation {
        Operation::Literal(text) => Some(format!("__buffer[#__buffer + 1] = {}", lua_string(text))),
        Operation::Expression(expr) => Some(format!(
            "__buffer[#__buffer + 1] = __text({})",
            expr.trim()
        )),
        Operation::Block(code) => Some(code.to_string()),
        Operation::Comment(_) | Operation::Directive { .. } => None,
    }
}

/// Backing field name for a property.
pub fn field_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("_{}{}", first.to_lowercase(), chars.as_str()),
        None => "_".to_string(),
    }
}

/// Quote text as a double-quoted Lua string literal.
pub fn lua_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(quoted, "\\x{:02x}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
