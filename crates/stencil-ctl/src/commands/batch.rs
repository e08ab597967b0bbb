//! `batch`: run every property set listed in a batch file.
//!
//! ```xml
//! <codeGenerator>
//!   <defaultTemplate path="entity.cst"/>
//!   <defaultOutput path="out/entities.cs"/>
//!   <defaultProperties>
//!     <property name="Namespace">Acme.Data</property>
//!   </defaultProperties>
//!   <propertySets>
//!     <propertySet output="out/Customer.cs">
//!       <property name="ClassName">Customer</property>
//!     </propertySet>
//!     <propertySet template="view.cst">
//!       <property name="ClassName">Order</property>
//!     </propertySet>
//!   </propertySets>
//! </codeGenerator>
//! ```
//!
//! Relative paths resolve against the batch file's directory. Consecutive
//! property sets naming the same template share one runner, so a value set
//! by an earlier set stays in place until a later set overwrites it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use stencil::{PropertySet, Runner};
use tracing::{debug, info};

use super::{base_properties, Session};
use crate::cli_config::CliConfig;
use crate::BatchArgs;

#[derive(Debug, Default)]
pub(crate) struct BatchFile {
    pub default_template: Option<PathBuf>,
    pub default_output: Option<PathBuf>,
    pub default_properties: PropertySet,
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug)]
pub(crate) struct BatchEntry {
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub properties: PropertySet,
}

pub(crate) fn handle_batch_command(args: BatchArgs, config: &CliConfig) -> anyhow::Result<()> {
    let xml = std::fs::read_to_string(&args.batch)
        .with_context(|| format!("cannot read batch file '{}'", args.batch.display()))?;
    let batch = parse_batch(&xml)
        .with_context(|| format!("invalid batch file '{}'", args.batch.display()))?;
    let base_dir = match args.batch.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut session = Session::new(&args.run, config);
    let base = base_properties(&args.run)?;
    let default_template = args
        .template
        .clone()
        .or_else(|| batch.default_template.as_ref().map(|p| base_dir.join(p)));
    let default_output = args
        .run
        .out
        .clone()
        .or_else(|| batch.default_output.as_ref().map(|p| base_dir.join(p)));

    let mut current: Option<(PathBuf, Runner)> = None;
    for (index, entry) in batch.entries.iter().enumerate() {
        let template = match (&entry.template, &default_template) {
            (Some(path), _) => base_dir.join(path),
            (None, Some(path)) => path.clone(),
            (None, None) => bail!("property set {} names no template and there is no default", index + 1),
        };

        let mut runner = match current.take() {
            Some((path, runner)) if path == template => {
                debug!(template = %template.display(), "reusing runner");
                runner
            }
            previous => {
                drop(previous);
                session.load(&template)?
            }
        };

        let mut properties = base.clone();
        properties.extend(&batch.default_properties);
        properties.extend(&entry.properties);
        runner.set_properties(&properties)?;
        let text = runner
            .run()
            .with_context(|| format!("property set {} failed", index + 1))?;

        let output = entry.output.as_ref().map(|p| base_dir.join(p));
        session.write(&text, output.as_deref().or(default_output.as_deref()))?;
        current = Some((template, runner));
    }

    info!(sets = batch.entries.len(), "batch complete");
    Ok(())
}

const ROOT_NAMES: [&[u8]; 2] = [b"codeGenerator", b"codeSmith"];

/// Parse a batch document. Property bodies are handed to
/// [`PropertySet::parse`] unchanged.
pub(crate) fn parse_batch(xml: &str) -> anyhow::Result<BatchFile> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut batch = BatchFile::default();
    let mut depth = 0_u32;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match (depth, e.name().as_ref()) {
                (0, name) if ROOT_NAMES.contains(&name) => depth = 1,
                (1, b"defaultTemplate") => {
                    batch.default_template = path_attribute(&e, b"path")?;
                    reader.read_to_end(e.name())?;
                }
                (1, b"defaultOutput") => {
                    batch.default_output = path_attribute(&e, b"path")?;
                    reader.read_to_end(e.name())?;
                }
                (1, b"defaultProperties") => {
                    let body = reader.read_text(e.name())?;
                    batch.default_properties = property_body(&body)?;
                }
                (1, b"propertySets") => depth = 2,
                (2, b"propertySet") => {
                    let template = path_attribute(&e, b"template")?;
                    let output = path_attribute(&e, b"output")?;
                    let body = reader.read_text(e.name())?;
                    batch.entries.push(BatchEntry {
                        template,
                        output,
                        properties: property_body(&body)?,
                    });
                }
                _ => bail!("unexpected element <{}>", element_name(&e)),
            },
            Event::Empty(e) => match (depth, e.name().as_ref()) {
                (1, b"defaultTemplate") => batch.default_template = path_attribute(&e, b"path")?,
                (1, b"defaultOutput") => batch.default_output = path_attribute(&e, b"path")?,
                (1, b"defaultProperties" | b"propertySets") => {}
                (2, b"propertySet") => batch.entries.push(BatchEntry {
                    template: path_attribute(&e, b"template")?,
                    output: path_attribute(&e, b"output")?,
                    properties: PropertySet::new(),
                }),
                _ => bail!("unexpected element <{}>", element_name(&e)),
            },
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if !text.trim().is_empty() {
                    bail!("unexpected text '{}'", text.trim());
                }
            }
            Event::Eof => bail!("document ended before the batch was closed"),
            _ => {}
        }
    }

    Ok(batch)
}

fn property_body(body: &str) -> anyhow::Result<PropertySet> {
    let xml = format!("<codeGenerator><propertySet>{body}</propertySet></codeGenerator>");
    Ok(PropertySet::parse(&xml)?)
}

fn path_attribute(e: &BytesStart<'_>, key: &[u8]) -> anyhow::Result<Option<PathBuf>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value()?;
            return Ok(Some(Path::new(value.trim()).to_path_buf()));
        }
    }
    Ok(None)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}
