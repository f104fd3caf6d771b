//! Declarative stack definitions loaded from a YAML definitions file.
//!
//! A definitions file maps definition names to definitions; a definition
//! holds named stacks plus variables shared by all of them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};

use crate::error::{ForgeError, Result};

/// Template-rendering variables.
pub type Variables = BTreeMap<String, Value>;

/// Extra keys of a parameter declaration, rendered into the template's
/// `Parameters` section (`type`, `description`, `default`, ...).
pub type Attributes = BTreeMap<String, Value>;

// ─── Definitions file ────────────────────────────────────────────────

/// Every definition of one definitions file.
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    source: String,
    definitions: BTreeMap<String, Definition>,
}

impl DefinitionFile {
    /// Read and parse a definitions file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::InvalidDefinition(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    /// Parse definitions from YAML text. `source` names the origin in errors.
    pub fn from_yaml_str(text: &str, source: &str) -> Result<Self> {
        let mut definitions: BTreeMap<String, Definition> = serde_yaml::from_str(text)
            .map_err(|e| ForgeError::InvalidDefinition(format!("{source}: {e}")))?;
        for (name, definition) in &mut definitions {
            definition.name.clone_from(name);
        }
        Ok(Self {
            source: source.to_string(),
            definitions,
        })
    }

    pub fn definition(&self, name: &str) -> Result<&Definition> {
        self.definitions
            .get(name)
            .ok_or_else(|| ForgeError::DefinitionNotFound {
                definition: name.to_string(),
                file: self.source.clone(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

/// A named collection of stacks plus shared rendering variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Definition {
    #[serde(skip)]
    pub name: String,
    pub stacks: BTreeMap<String, StackDefinition>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Variables,
    /// Directory resource templates are loaded from.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    #[serde(default)]
    pub region: Option<String>,
}

impl Definition {
    pub fn stack(&self, name: &str) -> Result<&StackDefinition> {
        self.stacks.get(name).ok_or_else(|| ForgeError::StackNotFound {
            stack: name.to_string(),
            definition: self.name.clone(),
        })
    }
}

/// One deployable unit. Resource declarations are opaque here and handed to
/// the renderer untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackDefinition {
    #[serde(default)]
    pub resources: Option<Value>,
    /// JSON file of already-rendered resources merged under `resources`.
    #[serde(default)]
    pub resource_chunk: Option<PathBuf>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requires: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: ParameterMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Variables,
}

/// An empty key (`variables:` or `variables: ~`) reads as an empty collection.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Parameters ──────────────────────────────────────────────────────

/// Parameter declarations in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct ParameterMap(Vec<(String, ParameterDeclaration)>);

impl ParameterMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterDeclaration)> {
        self.0.iter().map(|(name, decl)| (name.as_str(), decl))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParameterDeclaration)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (String, ParameterDeclaration)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Mapping> for ParameterMap {
    type Error = String;

    fn try_from(mapping: Mapping) -> std::result::Result<Self, Self::Error> {
        mapping
            .into_iter()
            .map(|(key, value)| {
                let name = key
                    .as_str()
                    .ok_or_else(|| format!("parameter name {key:?} is not a string"))?
                    .to_string();
                let decl = ParameterDeclaration::try_from(value)
                    .map_err(|e| format!("parameter {name}: {e}"))?;
                Ok((name, decl))
            })
            .collect()
    }
}

/// How a parameter obtains the value handed to the create call.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterDeclaration {
    /// A value written in the definition.
    Literal { value: String, attributes: Attributes },
    /// A value read from another stack's deployed state.
    Remote {
        reference: RemoteReference,
        attributes: Attributes,
    },
    /// Declared in the template only; the remote default applies.
    Declared { attributes: Attributes },
}

impl ParameterDeclaration {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn remote(reference: RemoteReference) -> Self {
        Self::Remote {
            reference,
            attributes: Attributes::new(),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Literal { attributes, .. }
            | Self::Remote { attributes, .. }
            | Self::Declared { attributes } => attributes,
        }
    }

    pub fn reference(&self) -> Option<&RemoteReference> {
        match self {
            Self::Remote { reference, .. } => Some(reference),
            Self::Literal { .. } | Self::Declared { .. } => None,
        }
    }
}

/// Stringify a YAML scalar the way the control plane expects parameter values.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_field(mapping: &Mapping, key: &str) -> std::result::Result<Option<String>, String> {
    match mapping.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_to_string(v)
            .map(Some)
            .ok_or_else(|| format!("{key} must be a scalar")),
    }
}

impl TryFrom<Value> for ParameterDeclaration {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let mapping = match value {
            Value::Mapping(mapping) => mapping,
            Value::Null => {
                return Ok(Self::Declared {
                    attributes: Attributes::new(),
                });
            }
            other => {
                return scalar_to_string(&other)
                    .map(Self::literal)
                    .ok_or_else(|| "value must be a scalar or a mapping".to_string());
            }
        };

        let mut attributes = Attributes::new();
        let mut source = None;
        let mut literal = None;
        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| format!("attribute name {key:?} is not a string"))?
                .to_string();
            match key.as_str() {
                "source" => source = Some(value),
                "value" => literal = Some(value),
                _ => {
                    attributes.insert(key, value);
                }
            }
        }

        match (source, literal) {
            (Some(_), Some(_)) => Err("source and value are mutually exclusive".to_string()),
            (Some(source), None) => {
                let Value::Mapping(source) = source else {
                    return Err("source must be a mapping".to_string());
                };
                let stack = string_field(&source, "stack")?
                    .ok_or_else(|| "source.stack is required".to_string())?;
                let kind = string_field(&source, "type")?
                    .ok_or_else(|| "source.type is required".to_string())?;
                let name = string_field(&source, "name")?;
                Ok(Self::Remote {
                    reference: RemoteReference { stack, kind, name },
                    attributes,
                })
            }
            (None, Some(literal)) => {
                let value = scalar_to_string(&literal)
                    .ok_or_else(|| "value must be a scalar".to_string())?;
                Ok(Self::Literal { value, attributes })
            }
            (None, None) => Ok(Self::Declared { attributes }),
        }
    }
}

/// A value obtained from another stack's deployed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReference {
    pub stack: String,
    /// Raw kind as written; checked when the value is fetched.
    pub kind: String,
    /// Remote value name; defaults to the referencing parameter's name.
    pub name: Option<String>,
}

impl RemoteReference {
    pub fn new(stack: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            stack: stack.into(),
            kind: kind.as_str().to_string(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value_name<'a>(&'a self, parameter: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(parameter)
    }

    pub fn source_kind(&self) -> Result<SourceKind> {
        self.kind.parse()
    }
}

/// What part of a remote stack a reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Physical id of a resource.
    Resource,
    Output,
    /// An input parameter the remote stack received.
    Parameter,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Output => "output",
            Self::Parameter => "parameter",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resource" => Ok(Self::Resource),
            "output" => Ok(Self::Output),
            "parameter" => Ok(Self::Parameter),
            _ => Err(ForgeError::BadValueType {
                kind: s.to_string(),
            }),
        }
    }
}
