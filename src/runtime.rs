//! Support library installed into every runner's Lua state.
//!
//! Globals:
//!
//! - `CodeGenerator.CodeTemplate`: default base type of generated classes.
//! - `CodeGenerator.Text`: case helpers (`snake_case`, `pascal_case`,
//!   `camel_case`, `kebab_case`, `lower_first`, `upper_first`).
//!
//! Generated chunks also receive a runtime table as their argument, holding
//! `resolve(path, kind)` and `text(value)`.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use mlua::{Lua, Table};

const RUNTIME_CHUNK: &str = r#"
local CodeTemplate = {}
CodeTemplate.__index = CodeTemplate
CodeTemplate.__name = "CodeGenerator.CodeTemplate"

function CodeTemplate:property_names()
  local names = {}
  for _, property in ipairs(rawget(getmetatable(self) or {}, "__properties") or {}) do
    names[#names + 1] = property.name
  end
  return names
end

local CodeGenerator = rawget(_G, "CodeGenerator") or {}
CodeGenerator.CodeTemplate = CodeTemplate
CodeGenerator.Text = ...
_G.CodeGenerator = CodeGenerator

local runtime = {}

function runtime.resolve(path, kind)
  local value = _G
  for part in string.gmatch(path, "[^%.]+") do
    if type(value) ~= "table" then
      value = nil
      break
    end
    value = value[part]
  end
  if value == nil then
    error(string.format("%s '%s' is not defined", kind or "name", path), 2)
  end
  if kind == "namespace" and type(value) ~= "table" then
    error(string.format("namespace '%s' is not a table", path), 2)
  end
  return value
end

function runtime.text(value)
  if value == nil then
    return ""
  end
  return tostring(value)
end

return runtime
"#;

fn first_char_with(text: &str, upper: bool) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn text_helpers(lua: &Lua) -> mlua::Result<Table> {
    let text = lua.create_table()?;
    text.set(
        "snake_case",
        lua.create_function(|_, s: String| Ok(s.to_snake_case()))?,
    )?;
    text.set(
        "pascal_case",
        lua.create_function(|_, s: String| Ok(s.to_upper_camel_case()))?,
    )?;
    text.set(
        "camel_case",
        lua.create_function(|_, s: String| Ok(s.to_lower_camel_case()))?,
    )?;
    text.set(
        "kebab_case",
        lua.create_function(|_, s: String| Ok(s.to_kebab_case()))?,
    )?;
    text.set(
        "lower_first",
        lua.create_function(|_, s: String| Ok(first_char_with(&s, false)))?,
    )?;
    text.set(
        "upper_first",
        lua.create_function(|_, s: String| Ok(first_char_with(&s, true)))?,
    )?;
    Ok(text)
}

/// Install the `CodeGenerator` globals and return the runtime table passed to
/// generated chunks.
pub fn install(lua: &Lua) -> mlua::Result<Table> {
    let text = text_helpers(lua)?;
    lua.load(RUNTIME_CHUNK)
        .set_name("=stencil-runtime")
        .call(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_helpers() {
        let lua = Lua::new();
        install(&lua).unwrap();
        let result: String = lua
            .load(
                r#"
                local T = CodeGenerator.Text
                return table.concat({
                  T.snake_case("OrderLine"),
                  T.pascal_case("order_line"),
                  T.camel_case("order_line"),
                  T.kebab_case("OrderLine"),
                  T.lower_first("Name"),
                  T.upper_first("name"),
                }, " ")
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(result, "order_line OrderLine orderLine order-line name Name");
    }

    #[test]
    fn test_resolve_dotted_paths() {
        let lua = Lua::new();
        let runtime = install(&lua).unwrap();
        lua.globals().set("runtime", runtime).unwrap();
        let found: bool = lua
            .load(r#"return runtime.resolve("CodeGenerator.CodeTemplate", "base type") == CodeGenerator.CodeTemplate"#)
            .eval()
            .unwrap();
        assert!(found);

        let err = lua
            .load(r#"return runtime.resolve("No.Such.Type", "base type")"#)
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("base type 'No.Such.Type' is not defined"));
    }

    #[test]
    fn test_namespace_must_be_a_table() {
        let lua = Lua::new();
        let runtime = install(&lua).unwrap();
        lua.globals().set("runtime", runtime).unwrap();
        let err = lua
            .load(r#"return runtime.resolve("_VERSION", "namespace")"#)
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("namespace '_VERSION' is not a table"));

        let is_table: bool = lua
            .load(r#"return type(runtime.resolve("string", "namespace")) == "table""#)
            .eval()
            .unwrap();
        assert!(is_table);
    }

    #[test]
    fn test_text_conversion() {
        let lua = Lua::new();
        let runtime = install(&lua).unwrap();
        let text: mlua::Function = runtime.get("text").unwrap();
        assert_eq!(text.call::<String>(mlua::Value::Nil).unwrap(), "");
        assert_eq!(text.call::<String>(12).unwrap(), "12");
        assert_eq!(text.call::<String>(true).unwrap(), "true");
    }
}
