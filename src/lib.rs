//! # stencil
//!
//! Text-template compiler and runner. A template mixes literal text with
//! embedded Lua:
//!
//! ```text
//! <%@ Property Name="ClassName" Type="string" %>
//! public class <%= ClassName %> {
//! <% for _, column in ipairs(Columns) do %>
//!     public <%= column.data_type %> <%= column.name %>;
//! <% end %>
//! }
//! ```
//!
//! [`TemplateCompiler`] turns the template into a Lua program with one
//! field and accessor pair per declared property and a `generate` method,
//! compiles it to bytecode and returns a [`CompiledUnit`] (or a
//! [`CompileReport`] of diagnostics). [`Runner`] loads the unit, binds a
//! [`PropertySet`] onto its instance and runs it.
//!
//! ```no_run
//! use stencil::{CompileOptions, PropertySet, Runner, TemplateCompiler};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let compiler = TemplateCompiler::new(CompileOptions::default());
//! let unit = compiler
//!     .compile("<%@ Property Name=\"Name\" Type=\"string\" %>Hello <%= Name %>!")?
//!     .into_result()
//!     .map_err(|report| report.to_string())?;
//! let mut runner = Runner::new(unit)?;
//! let mut properties = PropertySet::new();
//! properties.push("Name", "World");
//! runner.set_properties(&properties)?;
//! assert_eq!(runner.run()?, "Hello World!");
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod config;
pub mod directive;
pub mod emit;
pub mod error;
pub mod optimize;
pub mod preprocess;
pub mod program;
pub mod properties;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod scanner;
pub mod schema;
pub mod toolchain;

pub use compiler::{CompileOutcome, CompiledUnit, TemplateCompiler};
pub use config::CompileOptions;
pub use directive::{DirectiveError, PropertyDecl};
pub use error::TemplateError;
pub use preprocess::PreprocessError;
pub use program::{Operation, Program};
pub use properties::{PropertyError, PropertySet, PropertyType};
pub use registry::CompilerRegistry;
pub use runner::{Runner, RunnerError, RunnerState};
pub use scanner::ParseError;
pub use toolchain::{CompileReport, Diagnostic};
