//! Template document assembly.

use serde_json::{Map, Value};
use stackforge_core::ParameterMap;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Build the full document from rendered resources and the stack's
/// parameter declarations. Integers and booleans come out as strings.
pub fn assemble(
    resources: Map<String, Value>,
    parameters: &ParameterMap,
) -> Result<Value, serde_json::Error> {
    let mut doc = Map::new();
    doc.insert(
        "AWSTemplateFormatVersion".to_string(),
        Value::String(TEMPLATE_FORMAT_VERSION.to_string()),
    );
    doc.insert("Resources".to_string(), Value::Object(resources));
    if let Some(section) = parameters_section(parameters)? {
        doc.insert("Parameters".to_string(), Value::Object(section));
    }
    Ok(stringify_scalars(Value::Object(doc)))
}

/// `Parameters` entries for every declared parameter, or `None` when the
/// stack declares none.
pub fn parameters_section(
    parameters: &ParameterMap,
) -> Result<Option<Map<String, Value>>, serde_json::Error> {
    if parameters.is_empty() {
        return Ok(None);
    }
    let mut section = Map::new();
    for (name, decl) in parameters.iter() {
        let mut entry = Map::new();
        for (key, value) in decl.attributes() {
            entry.insert(capitalize(key), serde_json::to_value(value)?);
        }
        entry
            .entry("Type")
            .or_insert_with(|| Value::String("String".to_string()));
        section.insert(name.to_string(), Value::Object(entry));
    }
    Ok(Some(section))
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Recursively replace integers and booleans with their string form.
pub fn stringify_scalars(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, stringify_scalars(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_scalars).collect()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Value::String(n.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackforge_core::{ParameterDeclaration, RemoteReference, SourceKind};

    #[test]
    fn scalars_are_stringified_recursively() {
        let value = json!({
            "Port": 443,
            "Enabled": true,
            "Ratio": 0.5,
            "Nested": [{"Count": -1}, "x", null]
        });
        assert_eq!(
            stringify_scalars(value),
            json!({
                "Port": "443",
                "Enabled": "true",
                "Ratio": 0.5,
                "Nested": [{"Count": "-1"}, "x", null]
            })
        );
    }

    #[test]
    fn capitalizes_only_the_first_letter() {
        assert_eq!(capitalize("type"), "Type");
        assert_eq!(capitalize("allowedValues"), "AllowedValues");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn parameter_entries_drop_source_and_default_type() {
        let yaml: serde_yaml::Value = serde_yaml::from_str(
            "{source: {stack: vpc, type: resource}, type: AWS::EC2::VPC::Id, description: the vpc}",
        )
        .expect("yaml");
        let params: ParameterMap = [
            (
                "VPC".to_string(),
                ParameterDeclaration::try_from(yaml).expect("decl"),
            ),
            (
                "Env".to_string(),
                ParameterDeclaration::remote(RemoteReference::new("base", SourceKind::Output)),
            ),
            ("Size".to_string(), ParameterDeclaration::literal("3")),
        ]
        .into_iter()
        .collect();
        let section = parameters_section(&params).expect("section").expect("some");
        assert_eq!(
            Value::Object(section),
            json!({
                "VPC": {"Type": "AWS::EC2::VPC::Id", "Description": "the vpc"},
                "Env": {"Type": "String"},
                "Size": {"Type": "String"}
            })
        );
    }

    #[test]
    fn no_parameters_means_no_section() {
        let doc = assemble(Map::new(), &ParameterMap::default()).expect("doc");
        assert_eq!(
            doc,
            json!({"AWSTemplateFormatVersion": "2010-09-09", "Resources": {}})
        );
    }
}
