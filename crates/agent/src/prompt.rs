use std::fs;
use std::path::Path;

use ema_core::config::{AgentConfig, AppConfig};
use serde_json::{Map, Value};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, warn};

pub const ANSWER_TEMPLATE: &str = "answer_user_question.tera";

const EMBEDDED_ANSWER_TEMPLATE: &str =
    include_str!("../../../templates/answer_user_question.tera");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to load templates from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: tera::Error,
    },
    #[error("template not found: {0}")]
    Missing(String),
    #[error("failed to render template {template}: {source}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },
    #[error("failed to read schema file {path}: {source}")]
    Schema {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Renders a named template into the system prompt. Pure: no side effects.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &Map<String, Value>) -> Result<String, PromptError>;
}

pub struct TeraPrompts {
    tera: Tera,
}

impl TeraPrompts {
    pub fn embedded() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(ANSWER_TEMPLATE, EMBEDDED_ANSWER_TEMPLATE).map_err(|source| {
            PromptError::Load { path: "<embedded>".to_string(), source }
        })?;
        Ok(Self { tera })
    }

    /// Loads every template under `dir`, falling back to the embedded set
    /// for names the directory does not provide.
    pub fn from_dir(dir: &Path) -> Result<Self, PromptError> {
        let embedded = Self::embedded()?;
        if !dir.is_dir() {
            warn!(
                event_name = "prompt.templates.dir_missing",
                path = %dir.display(),
                "template directory not found, using embedded templates"
            );
            return Ok(embedded);
        }

        let pattern = format!("{}/**/*", dir.display());
        let mut tera = Tera::new(&pattern)
            .map_err(|source| PromptError::Load { path: dir.display().to_string(), source })?;
        tera.extend(&embedded.tera)
            .map_err(|source| PromptError::Load { path: dir.display().to_string(), source })?;

        debug!(
            event_name = "prompt.templates.loaded",
            path = %dir.display(),
            templates = tera.get_template_names().count(),
            "loaded prompt templates"
        );
        Ok(Self { tera })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, PromptError> {
        match &config.template_dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::embedded(),
        }
    }
}

impl PromptRenderer for TeraPrompts {
    fn render(&self, template: &str, vars: &Map<String, Value>) -> Result<String, PromptError> {
        if !self.tera.get_template_names().any(|name| name == template) {
            return Err(PromptError::Missing(template.to_string()));
        }

        let context = Context::from_serialize(vars).map_err(|source| PromptError::Render {
            template: template.to_string(),
            source,
        })?;
        self.tera
            .render(template, &context)
            .map_err(|source| PromptError::Render { template: template.to_string(), source })
    }
}

/// Shared prompt variables from config: the schema files as `linear_gql_schema`
/// and `sql_schema`, and the configured Linear teams as `team_keys`.
pub fn schema_vars(config: &AppConfig) -> Result<Map<String, Value>, PromptError> {
    let mut vars = Map::new();
    let sources = [
        ("linear_gql_schema", config.agent.tracker_schema_path.as_deref()),
        ("sql_schema", config.agent.sql_schema_path.as_deref()),
    ];

    for (name, path) in sources {
        let Some(path) = path else { continue };
        let text = fs::read_to_string(path)
            .map_err(|source| PromptError::Schema { path: path.display().to_string(), source })?;
        vars.insert(name.to_string(), Value::String(text));
    }

    if !config.linear.team_keys.is_empty() {
        let keys = config.linear.team_keys.iter().cloned().map(Value::String).collect();
        vars.insert("team_keys".to_string(), Value::Array(keys));
    }

    Ok(vars)
}
