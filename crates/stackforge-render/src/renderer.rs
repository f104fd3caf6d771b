//! Handlebars renderer for stack definitions.
//!
//! Each resource of a stack names a template (`<resource>.yaml` unless the
//! declaration says otherwise). The template is rendered with the merged
//! variables, parsed as YAML and placed under the resource's name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde_json::{Map, Value as Json};
use serde_yaml::{Mapping, Value as Yaml};
use stackforge_core::{Definition, StackDefinition, TemplateRenderer, Variables};

use crate::document;
use crate::error::RenderError;

/// Where resource templates come from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Files under a directory.
    Directory(PathBuf),
    /// In-memory templates keyed by file name.
    Inline(HashMap<String, String>),
}

pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
    source: TemplateSource,
}

impl std::fmt::Debug for HandlebarsRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlebarsRenderer")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// One resource declaration after defaults are applied.
struct ResourceSpec<'a> {
    name: String,
    template: String,
    variables: Option<&'a Mapping>,
}

impl HandlebarsRenderer {
    pub fn new(source: TemplateSource) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars, source }
    }

    pub fn from_directory(dir: impl Into<PathBuf>) -> Self {
        Self::new(TemplateSource::Directory(dir.into()))
    }

    pub fn from_templates<K, V>(templates: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(TemplateSource::Inline(
            templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Templates from the definition's `template_path`, else the working
    /// directory.
    pub fn for_definition(definition: &Definition) -> Self {
        let dir = definition
            .template_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_directory(dir)
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Render the stack into a template document.
    pub fn render_document(
        &self,
        stack: &StackDefinition,
        shared: &Variables,
    ) -> Result<Json, RenderError> {
        let mut resources = match &stack.resource_chunk {
            Some(path) => load_chunk(path)?,
            None => Map::new(),
        };

        if let Some(declared) = &stack.resources {
            let Yaml::Mapping(declared) = declared else {
                return Err(RenderError::malformed("bad resources definition"));
            };
            let mut variables = shared.clone();
            variables.extend(stack.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
            for (key, decl) in declared {
                let spec = resource_spec(key, decl)?;
                let rendered = self.render_resource(&spec, &variables)?;
                resources.insert(spec.name, rendered);
            }
        }

        if resources.is_empty() {
            return Err(RenderError::NoResources);
        }
        tracing::debug!("rendered {} resources", resources.len());
        Ok(document::assemble(resources, &stack.parameters)?)
    }

    fn render_resource(
        &self,
        spec: &ResourceSpec<'_>,
        inherited: &Variables,
    ) -> Result<Json, RenderError> {
        let text = self.template_text(&spec.name, &spec.template)?;

        let mut variables = inherited.clone();
        if let Some(own) = spec.variables {
            for (k, v) in own {
                let key = k
                    .as_str()
                    .ok_or_else(|| RenderError::malformed(format!("variable {k:?} of {}", spec.name)))?;
                variables.insert(key.to_string(), v.clone());
            }
        }

        let rendered = self
            .handlebars
            .render_template(&text, &variables)
            .map_err(|e| RenderError::Template {
                resource: spec.name.clone(),
                source: Box::new(e),
            })?;
        let yaml: Yaml = serde_yaml::from_str(&rendered).map_err(|e| RenderError::Yaml {
            resource: spec.name.clone(),
            source: e,
        })?;
        Ok(serde_json::to_value(yaml)?)
    }

    fn template_text(&self, resource: &str, template: &str) -> Result<String, RenderError> {
        let not_found = || RenderError::TemplateNotFound {
            resource: resource.to_string(),
            template: template.to_string(),
        };
        match &self.source {
            TemplateSource::Inline(templates) => templates.get(template).cloned().ok_or_else(not_found),
            TemplateSource::Directory(dir) => {
                let path = dir.join(template);
                std::fs::read_to_string(&path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        not_found()
                    } else {
                        RenderError::Io { path, source: e }
                    }
                })
            }
        }
    }
}

fn resource_spec<'a>(key: &Yaml, decl: &'a Yaml) -> Result<ResourceSpec<'a>, RenderError> {
    let key = key
        .as_str()
        .ok_or_else(|| RenderError::malformed(format!("resource name {key:?} is not a string")))?;
    let default_template = format!("{key}.yaml");
    match decl {
        Yaml::Null => Ok(ResourceSpec {
            name: key.to_string(),
            template: default_template,
            variables: None,
        }),
        Yaml::Mapping(options) => {
            let text_option = |field: &str| -> Result<Option<String>, RenderError> {
                match options.get(field) {
                    None | Some(Yaml::Null) => Ok(None),
                    Some(Yaml::String(s)) => Ok(Some(s.clone())),
                    Some(_) => Err(RenderError::malformed(format!(
                        "{field} of resource {key} must be a string"
                    ))),
                }
            };
            let variables = match options.get("variables") {
                None | Some(Yaml::Null) => None,
                Some(Yaml::Mapping(vars)) => Some(vars),
                Some(_) => {
                    return Err(RenderError::malformed(format!(
                        "variables of resource {key} must be a mapping"
                    )));
                }
            };
            Ok(ResourceSpec {
                name: text_option("name")?.unwrap_or_else(|| key.to_string()),
                template: text_option("template")?.unwrap_or(default_template),
                variables,
            })
        }
        _ => Err(RenderError::malformed(format!(
            "resource {key} must be null or a mapping"
        ))),
    }
}

fn load_chunk(path: &Path) -> Result<Map<String, Json>, RenderError> {
    let text = std::fs::read_to_string(path).map_err(|e| RenderError::Chunk {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    match serde_json::from_str(&text) {
        Ok(Json::Object(resources)) => Ok(resources),
        Ok(_) => Err(RenderError::Chunk {
            path: path.to_path_buf(),
            detail: "expected a JSON object of resources".to_string(),
        }),
        Err(e) => Err(RenderError::Chunk {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    type Error = RenderError;

    fn render_template_body(
        &self,
        stack: &StackDefinition,
        shared: &Variables,
    ) -> Result<String, RenderError> {
        let doc = self.render_document(stack, shared)?;
        Ok(serde_json::to_string(&doc)?)
    }
}
