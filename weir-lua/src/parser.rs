//! Pipeline definition parser
//!
//! Evaluates a Lua pipeline definition in the sandbox and extracts its plugin
//! graph. A definition is a table with three sections:
//!
//! ```lua
//! return pipeline.define {
//!     inputs  = { pipeline.plugin("generator", { id = "gen" }) },
//!     filters = { { plugin = "mutate", add_field = { source = "weir" } } },
//!     outputs = { { plugin = "null" } },
//! }
//! ```
//!
//! `inputs` and `outputs` must be non-empty, `filters` may be omitted.

use anyhow::{Context, Result};
use mlua::{Table, Value};
use serde::Serialize;
use std::collections::HashSet;

use crate::sandbox::create_sandbox;

/// Pipeline graph section a plugin belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Input,
    Filter,
    Output,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Input, Section::Filter, Section::Output];

    /// Field name of the section in a definition, also used as metric segment
    pub fn key(&self) -> &'static str {
        match self {
            Section::Input => "inputs",
            Section::Filter => "filters",
            Section::Output => "outputs",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            Section::Input => "input",
            Section::Filter => "filter",
            Section::Output => "output",
        }
    }
}

/// One plugin of a pipeline graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDefinition {
    pub section: Section,
    /// Plugin type, e.g. "generator"
    pub plugin: String,
    /// Unique id within the pipeline; defaults to `<section>-<plugin>-<n>`
    pub id: String,
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Parsed pipeline graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDefinition {
    pub inputs: Vec<PluginDefinition>,
    pub filters: Vec<PluginDefinition>,
    pub outputs: Vec<PluginDefinition>,
}

impl PipelineDefinition {
    pub fn section(&self, section: Section) -> &[PluginDefinition] {
        match section {
            Section::Input => &self.inputs,
            Section::Filter => &self.filters,
            Section::Output => &self.outputs,
        }
    }

    /// All plugins in graph order: inputs, filters, outputs
    pub fn plugins(&self) -> impl Iterator<Item = &PluginDefinition> {
        self.inputs
            .iter()
            .chain(self.filters.iter())
            .chain(self.outputs.iter())
    }
}

/// Parse a pipeline definition from Lua source code
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or does not evaluate to a table
/// - `inputs` or `outputs` is missing or empty
/// - A plugin entry has no `plugin` field or an unsupported option value
/// - Two plugins share an id
pub fn parse_pipeline_definition(source: &str) -> Result<PipelineDefinition> {
    let lua = create_sandbox().context("Failed to create sandbox")?;

    let pipeline: Table = lua
        .load(source)
        .set_name("pipeline")
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    let inputs = parse_section(&pipeline, Section::Input)?;
    let filters = parse_section(&pipeline, Section::Filter)?;
    let outputs = parse_section(&pipeline, Section::Output)?;

    if inputs.is_empty() {
        anyhow::bail!("Pipeline must have at least one input");
    }
    if outputs.is_empty() {
        anyhow::bail!("Pipeline must have at least one output");
    }

    let definition = PipelineDefinition {
        inputs,
        filters,
        outputs,
    };

    let mut seen = HashSet::new();
    for plugin in definition.plugins() {
        if !seen.insert(plugin.id.as_str()) {
            anyhow::bail!("Duplicate plugin id '{}'", plugin.id);
        }
    }

    Ok(definition)
}

/// Parse one section array from the pipeline table
fn parse_section(pipeline: &Table, section: Section) -> Result<Vec<PluginDefinition>> {
    let value: Value = pipeline.get(section.key()).unwrap_or(Value::Nil);

    let table = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(table) => table,
        _ => anyhow::bail!("Field '{}' must be an array of plugins", section.key()),
    };

    let mut plugins = Vec::new();
    for (index, entry) in table.sequence_values::<Table>().enumerate() {
        let entry = entry
            .with_context(|| format!("Failed to read {} entry {}", section.singular(), index + 1))?;
        plugins.push(
            parse_plugin(&entry, section, index)
                .with_context(|| format!("Invalid {} at position {}", section.singular(), index + 1))?,
        );
    }

    Ok(plugins)
}

fn parse_plugin(entry: &Table, section: Section, index: usize) -> Result<PluginDefinition> {
    let plugin: String = entry
        .get("plugin")
        .context("Plugin must have a 'plugin' field")?;

    let id: Option<String> = entry.get("id").context("Plugin 'id' must be a string")?;
    let id = id.unwrap_or_else(|| format!("{}-{}-{}", section.singular(), plugin, index + 1));

    let mut options = serde_json::Map::new();
    for pair in entry.clone().pairs::<Value, Value>() {
        let (key, value) = pair.context("Failed to read plugin option")?;
        let key = match key {
            Value::String(s) => s.to_str()?.to_string(),
            _ => anyhow::bail!("Plugin '{}' option keys must be strings", plugin),
        };
        if key == "plugin" || key == "id" {
            continue;
        }
        let json = lua_value_to_json(&value)
            .with_context(|| format!("Plugin '{}' option '{}' has an unsupported value", plugin, key))?;
        options.insert(key, json);
    }

    Ok(PluginDefinition {
        section,
        plugin,
        id,
        options,
    })
}

/// Convert mlua Value to serde_json Value
///
/// Tables with only integer keys become arrays, tables with only string keys
/// become objects.
fn lua_value_to_json(val: &Value) -> Result<serde_json::Value> {
    match val {
        Value::String(s) => Ok(serde_json::Value::String(s.to_str()?.to_string())),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| anyhow::anyhow!("Invalid number value")),
        Value::Integer(i) => Ok(serde_json::Value::Number((*i).into())),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Table(table) => {
            if table.raw_len() > 0 {
                let mut items = Vec::new();
                for item in table.clone().sequence_values::<Value>() {
                    items.push(lua_value_to_json(&item?)?);
                }
                return Ok(serde_json::Value::Array(items));
            }

            let mut object = serde_json::Map::new();
            for pair in table.clone().pairs::<String, Value>() {
                let (key, value) = pair.context("Table keys must be strings")?;
                object.insert(key, lua_value_to_json(&value)?);
            }
            Ok(serde_json::Value::Object(object))
        }
        _ => Err(anyhow::anyhow!(
            "Unsupported Lua value type for JSON conversion"
        )),
    }
}
