//! Directive and attribute parsing.
//!
//! A directive tag's inner text is a keyword followed by `name="value"` pairs:
//!
//! ```text
//! <%@ Property Name="ClassName" Type="string" Description="Generated class" %>
//! ```
//!
//! Keywords and attribute names are matched case-insensitively with `-` and `_`
//! ignored, so `TargetLanguage`, `target-language` and `target_language` are the
//! same attribute.

use std::path::PathBuf;

use crate::scanner::{snippet, ParseError};

/// Ordered `name="value"` attributes. A repeated name keeps its first position
/// and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Insert an attribute, replacing the value of an existing one with the same
    /// normalized name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let key = normalize(&name);
        match self.0.iter_mut().find(|(existing, _)| normalize(existing) == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Look up an attribute by normalized name.
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = normalize(name);
        self.0
            .iter()
            .find(|(existing, _)| normalize(existing) == key)
            .map(|(_, value)| value.as_str())
    }

    /// Look up the first attribute present among several accepted spellings.
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attribute text that is not a sequence of `name="value"` pairs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed attribute at byte {offset}")]
pub struct AttributeSyntaxError {
    pub offset: usize,
}

/// Parse a whitespace-separated sequence of `name="value"` pairs.
pub fn parse_attributes(text: &str) -> Result<Attributes, AttributeSyntaxError> {
    let mut attributes = Attributes::default();
    let bytes = text.as_bytes();
    let mut pos = skip_whitespace(text, 0);

    while pos < bytes.len() {
        let name_start = pos;
        while pos < bytes.len() && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let name = &text[name_start..pos];
        pos = skip_whitespace(text, pos);

        if name.is_empty() || bytes.get(pos) != Some(&b'=') {
            return Err(AttributeSyntaxError { offset: name_start });
        }
        pos = skip_whitespace(text, pos + 1);

        if bytes.get(pos) != Some(&b'"') {
            return Err(AttributeSyntaxError { offset: pos });
        }
        let value_start = pos + 1;
        let Some(len) = text[value_start..].find('"') else {
            return Err(AttributeSyntaxError { offset: pos });
        };
        attributes.insert(name, &text[value_start..value_start + len]);
        pos = skip_whitespace(text, value_start + len + 1);
    }

    Ok(attributes)
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut pos = from;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A directive tag split into its keyword and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveTag {
    pub name: String,
    pub attributes: Attributes,
}

/// Parse the inner text of a `<%@ ... %>` tag.
pub fn parse_directive(text: &str, line: usize) -> Result<DirectiveTag, ParseError> {
    let malformed = || ParseError::MalformedDirective {
        line,
        snippet: snippet(text.trim()),
    };

    let trimmed = text.trim_start();
    let keyword_len = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    let name = &trimmed[..keyword_len];
    if name.is_empty() || name.contains('=') {
        return Err(malformed());
    }

    let attributes = parse_attributes(&trimmed[keyword_len..]).map_err(|_| malformed())?;
    Ok(DirectiveTag {
        name: name.to_string(),
        attributes,
    })
}

/// A required directive attribute was missing, or a declaration conflicts with
/// an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    #[error("line {line}: {directive} directive requires a {attribute} attribute")]
    MissingAttribute {
        line: usize,
        directive: String,
        attribute: &'static str,
    },

    #[error("line {line}: property '{name}' is declared more than once")]
    DuplicateProperty { line: usize, name: String },
}

/// Template-level settings from a configuration directive. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    pub language: Option<String>,
    pub target_language: Option<String>,
    pub base_type: Option<String>,
    pub code_behind: Option<PathBuf>,
}

/// A declared template property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDecl {
    /// Property name as written; also the accessor suffix.
    pub name: String,
    /// Type descriptor (`string`, `int`, `Database`, ...).
    pub type_name: String,
    /// Initial value applied when the instance is created.
    pub default: Option<String>,
    /// Remaining attributes (`Category`, `Description`, `Optional`, ...).
    pub metadata: Attributes,
}

/// A directive interpreted against the known keyword set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Configuration(Configuration),
    LibraryReference(String),
    NamespaceImport(String),
    Property(PropertyDecl),
    /// Unknown keyword, kept as metadata only.
    Unrecognized(String),
}

impl Directive {
    /// Interpret a parsed directive tag, checking required attributes.
    pub fn interpret(tag: &DirectiveTag, line: usize) -> Result<Self, DirectiveError> {
        let attrs = &tag.attributes;
        let require = |names: &[&str], attribute: &'static str| {
            attrs
                .get_any(names)
                .map(str::to_string)
                .ok_or_else(|| DirectiveError::MissingAttribute {
                    line,
                    directive: tag.name.clone(),
                    attribute,
                })
        };

        let directive = match normalize(&tag.name).as_str() {
            "codetemplate" | "templateconfiguration" => Directive::Configuration(Configuration {
                language: attrs.get("language").map(str::to_string),
                target_language: attrs.get("targetlanguage").map(str::to_string),
                base_type: attrs
                    .get_any(&["inherits", "basetype"])
                    .map(str::to_string),
                code_behind: attrs.get_any(&["src", "codebehind"]).map(PathBuf::from),
            }),
            "assembly" | "libraryreference" => {
                Directive::LibraryReference(require(&["name"], "name")?)
            }
            "import" | "namespaceimport" => {
                Directive::NamespaceImport(require(&["namespace"], "namespace")?)
            }
            "property" | "propertydeclaration" => {
                let name = require(&["name"], "name")?;
                let type_name = require(&["type"], "type")?;
                let mut metadata = Attributes::default();
                for (key, value) in attrs.iter() {
                    if !matches!(normalize(key).as_str(), "name" | "type" | "default") {
                        metadata.insert(key, value);
                    }
                }
                Directive::Property(PropertyDecl {
                    name,
                    type_name,
                    default: attrs.get("default").map(str::to_string),
                    metadata,
                })
            }
            _ => Directive::Unrecognized(tag.name.clone()),
        };
        Ok(directive)
    }
}
