use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("malformed stack definition: {reason}")]
    Malformed { reason: String },

    #[error("stack has no resources")]
    NoResources,

    #[error("template {template} for resource {resource} not found")]
    TemplateNotFound { resource: String, template: String },

    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render resource {resource}: {source}")]
    Template {
        resource: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("resource {resource} did not render to valid YAML: {source}")]
    Yaml {
        resource: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("resource chunk {}: {detail}", path.display())]
    Chunk { path: PathBuf, detail: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
