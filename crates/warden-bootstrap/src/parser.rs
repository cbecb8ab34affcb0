use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use warden_types::{Result, WardenError};

/// The deterministic triple extracted from any agent-definition form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// The four accepted input forms.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// Frontmatter-prefixed markdown.
    Markdown(String),
    /// A JSON document.
    Json(String),
    /// An already-parsed object.
    Value(serde_json::Value),
    /// A file path resolving to one of the above by extension.
    Path(PathBuf),
}

/// Parse any supported form into an `AgentDefinition`.
pub fn parse_definition(source: DefinitionSource) -> Result<AgentDefinition> {
    match source {
        DefinitionSource::Markdown(text) => parse_markdown(&text),
        DefinitionSource::Json(text) => {
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| WardenError::invalid(format!("malformed JSON definition: {e}")))?;
            parse_value(value)
        }
        DefinitionSource::Value(value) => parse_value(value),
        DefinitionSource::Path(path) => parse_path(&path),
    }
}

fn parse_path(path: &Path) -> Result<AgentDefinition> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WardenError::invalid(format!("cannot read definition {}: {e}", path.display()))
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("md") | Some("markdown") => parse_markdown(&content),
        Some("json") => parse_definition(DefinitionSource::Json(content)),
        other => Err(WardenError::invalid(format!(
            "unsupported definition extension: {other:?}",
        ))),
    }
}

fn parse_value(value: serde_json::Value) -> Result<AgentDefinition> {
    let object = value
        .as_object()
        .ok_or_else(|| WardenError::invalid("definition must be a JSON object"))?;
    let name = object
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WardenError::invalid("definition is missing a name"))?
        .to_string();
    let description = object
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let metadata = object
        .iter()
        .filter(|(key, _)| *key != "name" && *key != "description")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(AgentDefinition {
        name,
        description,
        metadata,
    })
}

/// Frontmatter-prefixed markdown: a `---`-fenced YAML mapping followed by
/// a free-text body. `name` must come from the frontmatter; `description`
/// falls back to the body when the frontmatter omits it, and the body is
/// always appended for keyword detection.
fn parse_markdown(text: &str) -> Result<AgentDefinition> {
    let (frontmatter, body) = split_frontmatter(text)
        .ok_or_else(|| WardenError::invalid("markdown definition has no frontmatter block"))?;

    let mapping: serde_yaml::Mapping = serde_yaml::from_str(frontmatter)
        .map_err(|e| WardenError::invalid(format!("malformed frontmatter: {e}")))?;

    let get_str = |key: &str| -> Option<String> {
        mapping
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string)
    };

    let name = get_str("name")
        .ok_or_else(|| WardenError::invalid("frontmatter is missing a name"))?;
    let body = body.trim();
    let description = match get_str("description") {
        Some(description) if body.is_empty() => description,
        Some(description) => format!("{description}\n\n{body}"),
        None => body.to_string(),
    };

    let mut metadata = serde_json::Map::new();
    for (key, value) in &mapping {
        let Some(key) = key.as_str() else { continue };
        if key == "name" || key == "description" {
            continue;
        }
        let json = serde_json::to_value(value)
            .map_err(|e| WardenError::invalid(format!("frontmatter key {key}: {e}")))?;
        metadata.insert(key.to_string(), json);
    }

    Ok(AgentDefinition {
        name,
        description,
        metadata,
    })
}

fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches(['-']).trim_start();
    Some((frontmatter, body))
}
