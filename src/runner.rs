//! Loads a compiled unit, binds property values and invokes generation.
//!
//! ```text
//! Unbound --bind/set_properties--> Bound --release--> Released
//!    \___________________release______________________/
//! ```
//!
//! One instance is created on first use and reused for every later
//! `set_properties`/`run` cycle: a value set once persists until it is
//! overwritten.

use std::fmt;
use std::path::{Path, PathBuf};

use mlua::{ChunkMode, FromLua, Function, Lua, LuaOptions, StdLib, Table, Value};
use quick_xml::escape::escape;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::compiler::CompiledUnit;
use crate::directive::PropertyDecl;
use crate::properties::{PropertyError, PropertySet, PropertyType};
use crate::runtime;
use crate::toolchain::{ReferenceBinding, ReferenceUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Unit loaded, no instance yet.
    Unbound,
    /// Instance created.
    Bound,
    /// Artifacts released; the runner can no longer be used.
    Released,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("cannot load compiled unit {class}: {source}")]
    Load {
        class: String,
        #[source]
        source: mlua::Error,
    },

    #[error("cannot read compilation artifact '{}': {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    PropertyBinding(#[from] PropertyError),

    #[error("{class}.generate raised an error: {source}")]
    RuntimeInvocation {
        class: String,
        #[source]
        source: mlua::Error,
    },

    #[error("runner for {class} has been released")]
    Released { class: String },
}

/// Runs one compiled unit.
pub struct Runner {
    lua: Lua,
    class_name: String,
    class: Option<Table>,
    instance: Option<Table>,
    properties: Vec<(PropertyDecl, PropertyType)>,
    artifacts: Option<TempDir>,
    keep_artifacts: bool,
    state: RunnerState,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("class_name", &self.class_name)
            .field("state", &self.state)
            .field("artifacts", &self.artifact_dir())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Load a compiled unit into a fresh Lua state.
    ///
    /// Artifacts are released if loading fails.
    pub fn new(unit: CompiledUnit) -> Result<Self, RunnerError> {
        let bytecode_path = unit.bytecode_path();
        let CompiledUnit {
            class_name,
            properties,
            references,
            artifacts,
            keep_artifacts,
            ..
        } = unit;

        // SAFETY: binary chunks are only ever produced by this crate's
        // toolchain from generated source, and the debug/ffi libraries stay out.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE, LuaOptions::new()) };

        let mut runner = Runner {
            lua,
            class_name,
            class: None,
            instance: None,
            properties: properties
                .into_iter()
                .map(|decl| {
                    let ty = PropertyType::parse(&decl.type_name);
                    (decl, ty)
                })
                .collect(),
            artifacts: Some(artifacts),
            keep_artifacts,
            state: RunnerState::Unbound,
        };
        let references: Vec<&ReferenceUnit> = references.iter().map(|r| r.as_ref()).collect();
        runner.load(&references, &bytecode_path)?;
        Ok(runner)
    }

    fn load(&mut self, references: &[&ReferenceUnit], bytecode_path: &Path) -> Result<(), RunnerError> {
        let load_error = |source| RunnerError::Load {
            class: self.class_name.clone(),
            source,
        };

        let runtime = runtime::install(&self.lua).map_err(load_error)?;
        let globals = self.lua.globals();

        for reference in references {
            debug!(class = %self.class_name, reference = %reference.name, "loading reference");
            let value: Value = self
                .lua
                .load(&reference.bytecode[..])
                .set_name(format!("@{}", reference.name))
                .set_mode(ChunkMode::Binary)
                .call(())
                .map_err(load_error)?;
            let Value::Table(exports) = value else {
                continue;
            };
            match &reference.binding {
                ReferenceBinding::Global(name) => globals.set(name.as_str(), exports).map_err(load_error)?,
                ReferenceBinding::Spread => {
                    for pair in exports.pairs::<Value, Value>() {
                        let (key, value) = pair.map_err(load_error)?;
                        globals.set(key, value).map_err(load_error)?;
                    }
                }
            }
        }

        let bytecode = std::fs::read(bytecode_path).map_err(|source| RunnerError::Artifact {
            path: bytecode_path.to_path_buf(),
            source,
        })?;
        let class: Table = self
            .lua
            .load(bytecode)
            .set_name(format!("@{}.lua", self.class_name))
            .set_mode(ChunkMode::Binary)
            .call(runtime)
            .map_err(load_error)?;
        self.class = Some(class);
        debug!(class = %self.class_name, "loaded compiled unit");
        Ok(())
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDecl> {
        self.properties.iter().map(|(decl, _)| decl)
    }

    /// Artifact directory, until released.
    pub fn artifact_dir(&self) -> Option<&Path> {
        self.artifacts.as_ref().map(TempDir::path)
    }

    /// Create the instance on first use and return it.
    pub fn bind(&mut self) -> Result<Table, RunnerError> {
        if self.state == RunnerState::Released {
            return Err(self.released());
        }
        if let Some(instance) = &self.instance {
            return Ok(instance.clone());
        }

        let class = self.class.clone().ok_or_else(|| self.released())?;
        let instance: Table = class
            .get::<Function>("new")
            .and_then(|new| new.call(()))
            .map_err(|source| RunnerError::Load {
                class: self.class_name.clone(),
                source,
            })?;

        for (decl, ty) in &self.properties {
            if let Some(default) = &decl.default {
                let value = ty.to_lua(&self.lua, &escape(default.as_str()), &decl.name)?;
                assign(&instance, decl, ty, value)?;
            }
        }

        debug!(class = %self.class_name, "created instance");
        self.instance = Some(instance.clone());
        self.state = RunnerState::Bound;
        Ok(instance)
    }

    /// Apply a property set. Names that match no declared property are ignored.
    ///
    /// Every value is read before any is assigned, so a set with one bad
    /// value leaves the instance unchanged.
    pub fn set_properties(&mut self, set: &PropertySet) -> Result<(), RunnerError> {
        let instance = self.bind()?;
        let mut values = Vec::with_capacity(set.len());
        for (name, raw) in set.entries() {
            let Some((decl, ty)) = self.properties.iter().find(|(decl, _)| decl.name == name) else {
                debug!(class = %self.class_name, property = name, "ignoring undeclared property");
                continue;
            };
            values.push((decl, ty, ty.to_lua(&self.lua, raw, name)?));
        }
        for (decl, ty, value) in values {
            assign(&instance, decl, ty, value)?;
        }
        Ok(())
    }

    /// Parse a property-set document and apply it.
    pub fn set_properties_xml(&mut self, xml: &str) -> Result<(), RunnerError> {
        let set = PropertySet::parse(xml)?;
        self.set_properties(&set)
    }

    /// Current value of a declared property, read through its getter.
    pub fn property<V: FromLua>(&mut self, name: &str) -> Result<V, RunnerError> {
        let instance = self.bind()?;
        instance
            .get::<Function>(format!("get_{name}"))
            .and_then(|getter| getter.call(instance.clone()))
            .map_err(|e| {
                RunnerError::PropertyBinding(PropertyError::Value {
                    property: name.to_string(),
                    type_name: "declared type".to_string(),
                    message: e.to_string(),
                })
            })
    }

    /// Invoke the generation method and return its text.
    pub fn run(&mut self) -> Result<String, RunnerError> {
        let instance = self.bind()?;
        let output: mlua::String = instance
            .get::<Function>("generate")
            .and_then(|generate| generate.call(instance.clone()))
            .map_err(|source| RunnerError::RuntimeInvocation {
                class: self.class_name.clone(),
                source,
            })?;
        let text = output
            .to_str()
            .map(|text| (*text).to_owned())
            .map_err(|source| RunnerError::RuntimeInvocation {
                class: self.class_name.clone(),
                source,
            })?;
        debug!(class = %self.class_name, bytes = text.len(), "generated output");
        Ok(text)
    }

    /// Drop the instance and delete the artifacts (or keep them when
    /// configured). Calling it again does nothing.
    pub fn release(&mut self) {
        if self.state == RunnerState::Released {
            return;
        }
        self.instance = None;
        self.class = None;
        if let Some(dir) = self.artifacts.take() {
            if self.keep_artifacts {
                let path = dir.keep();
                info!(class = %self.class_name, path = %path.display(), "kept compilation artifacts");
            } else if let Err(e) = dir.close() {
                warn!(class = %self.class_name, error = %e, "failed to delete compilation artifacts");
            }
        }
        self.state = RunnerState::Released;
        debug!(class = %self.class_name, "released runner");
    }

    fn released(&self) -> RunnerError {
        RunnerError::Released {
            class: self.class_name.clone(),
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.release();
    }
}

fn assign(instance: &Table, decl: &PropertyDecl, ty: &PropertyType, value: Value) -> Result<(), PropertyError> {
    instance
        .get::<Function>(format!("set_{}", decl.name))
        .and_then(|setter| setter.call::<()>((instance.clone(), value)))
        .map_err(|e| PropertyError::Value {
            property: decl.name.clone(),
            type_name: ty.to_string(),
            message: e.to_string(),
        })
}
