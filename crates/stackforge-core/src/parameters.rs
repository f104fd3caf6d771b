//! Resolve parameter declarations into the concrete key/value pairs passed to
//! a create call.

use stackforge_connector::{ConnectorError, StackConnector};

use crate::definition::{ParameterDeclaration, ParameterMap, RemoteReference, SourceKind};
use crate::error::{ForgeError, Result};

/// Concrete values for every literal and remote parameter, in declaration
/// order. Template-only declarations are skipped so the remote default applies.
pub fn resolve_parameters<C: StackConnector>(
    connector: &C,
    parameters: &ParameterMap,
) -> Result<Vec<(String, String)>> {
    let mut resolved = Vec::with_capacity(parameters.len());
    for (name, decl) in parameters.iter() {
        match decl {
            ParameterDeclaration::Literal { value, .. } => {
                resolved.push((name.to_string(), value.clone()));
            }
            ParameterDeclaration::Remote { reference, .. } => {
                let value = fetch(connector, name, reference)?;
                tracing::debug!(
                    "parameter {name} <- {} {} of {}",
                    reference.kind,
                    reference.value_name(name),
                    reference.stack
                );
                resolved.push((name.to_string(), value));
            }
            ParameterDeclaration::Declared { .. } => {}
        }
    }
    Ok(resolved)
}

fn fetch<C: StackConnector>(
    connector: &C,
    parameter: &str,
    reference: &RemoteReference,
) -> Result<String> {
    let kind = reference.source_kind()?;
    let name = reference.value_name(parameter);
    let not_found = || ForgeError::ValueNotFound {
        stack: reference.stack.clone(),
        name: name.to_string(),
        kind: kind.to_string(),
    };

    let found = match kind {
        SourceKind::Resource => connector
            .describe_resource(&reference.stack, name)
            .map_err(|e| missing_stack_is_missing_value(e, not_found))?,
        SourceKind::Output => connector
            .describe_stack(&reference.stack)
            .map_err(|e| missing_stack_is_missing_value(e, not_found))?
            .output(name)
            .map(str::to_string),
        SourceKind::Parameter => connector
            .describe_stack(&reference.stack)
            .map_err(|e| missing_stack_is_missing_value(e, not_found))?
            .parameter(name)
            .map(str::to_string),
    };
    found.ok_or_else(not_found)
}

fn missing_stack_is_missing_value(
    err: ConnectorError,
    not_found: impl FnOnce() -> ForgeError,
) -> ForgeError {
    if err.is_not_found() {
        not_found()
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackforge_connector::{KeyValue, MemoryConnector, RemoteStack, status};

    fn deployed() -> MemoryConnector {
        let conn = MemoryConnector::new();
        conn.insert_stack(RemoteStack {
            name: "vpc".into(),
            status: status::CREATE_COMPLETE.into(),
            outputs: vec![KeyValue::new("VpcId", "vpc-123")],
            parameters: vec![KeyValue::new("Cidr", "10.0.0.0/16")],
        });
        conn.insert_resource("vpc", "Subnet", "subnet-9");
        conn
    }

    fn remote(stack: &str, kind: SourceKind) -> ParameterDeclaration {
        ParameterDeclaration::remote(RemoteReference::new(stack, kind))
    }

    #[test]
    fn literal_passes_through() {
        let conn = MemoryConnector::new();
        let params: ParameterMap = [("Size".to_string(), ParameterDeclaration::literal("3"))]
            .into_iter()
            .collect();
        assert_eq!(
            resolve_parameters(&conn, &params).expect("resolve"),
            vec![("Size".to_string(), "3".to_string())]
        );
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn literal_only_map_keeps_declaration_order() {
        let conn = MemoryConnector::new();
        let params: ParameterMap = [("Zone", "b"), ("Count", "4"), ("Mode", "fast"), ("Arn", "x")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), ParameterDeclaration::literal(v)))
            .collect();
        let resolved = resolve_parameters(&conn, &params).expect("resolve");
        let expected: Vec<(String, String)> = params
            .iter()
            .map(|(name, decl)| match decl {
                ParameterDeclaration::Literal { value, .. } => (name.to_string(), value.clone()),
                other => panic!("expected a literal, got {other:?}"),
            })
            .collect();
        assert_eq!(resolved, expected);
        assert_eq!(
            resolved.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["Zone", "Count", "Mode", "Arn"]
        );
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn each_kind_reads_its_part_of_the_stack() {
        let conn = deployed();
        let params: ParameterMap = [
            ("Subnet".to_string(), remote("vpc", SourceKind::Resource)),
            ("VpcId".to_string(), remote("vpc", SourceKind::Output)),
            ("Cidr".to_string(), remote("vpc", SourceKind::Parameter)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            resolve_parameters(&conn, &params).expect("resolve"),
            vec![
                ("Subnet".to_string(), "subnet-9".to_string()),
                ("VpcId".to_string(), "vpc-123".to_string()),
                ("Cidr".to_string(), "10.0.0.0/16".to_string()),
            ]
        );
    }

    #[test]
    fn explicit_name_overrides_parameter_name() {
        let conn = deployed();
        let params: ParameterMap = [(
            "NetworkId".to_string(),
            ParameterDeclaration::remote(
                RemoteReference::new("vpc", SourceKind::Output).with_name("VpcId"),
            ),
        )]
        .into_iter()
        .collect();
        assert_eq!(
            resolve_parameters(&conn, &params).expect("resolve"),
            vec![("NetworkId".to_string(), "vpc-123".to_string())]
        );
    }

    #[test]
    fn declared_only_parameters_are_skipped() {
        let conn = deployed();
        let params: ParameterMap = [
            (
                "KeyName".to_string(),
                ParameterDeclaration::Declared {
                    attributes: Default::default(),
                },
            ),
            ("Size".to_string(), ParameterDeclaration::literal("1")),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            resolve_parameters(&conn, &params).expect("resolve"),
            vec![("Size".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn missing_output_is_value_not_found() {
        let conn = deployed();
        let params: ParameterMap = [("Nope".to_string(), remote("vpc", SourceKind::Output))]
            .into_iter()
            .collect();
        let err = resolve_parameters(&conn, &params).expect_err("missing");
        assert_eq!(err.to_string(), "stack vpc did not have output Nope");
    }

    #[test]
    fn output_lookup_is_exact() {
        let conn = deployed();
        let params: ParameterMap = [("vpcid".to_string(), remote("vpc", SourceKind::Output))]
            .into_iter()
            .collect();
        assert!(matches!(
            resolve_parameters(&conn, &params),
            Err(ForgeError::ValueNotFound { .. })
        ));
    }

    #[test]
    fn missing_resource_is_value_not_found() {
        let conn = deployed();
        let params: ParameterMap = [("Gateway".to_string(), remote("vpc", SourceKind::Resource))]
            .into_iter()
            .collect();
        assert!(matches!(
            resolve_parameters(&conn, &params),
            Err(ForgeError::ValueNotFound { kind, .. }) if kind == "resource"
        ));
    }

    #[test]
    fn absent_stack_is_value_not_found() {
        let conn = MemoryConnector::new();
        let params: ParameterMap = [("VpcId".to_string(), remote("vpc", SourceKind::Output))]
            .into_iter()
            .collect();
        assert!(matches!(
            resolve_parameters(&conn, &params),
            Err(ForgeError::ValueNotFound { stack, .. }) if stack == "vpc"
        ));
    }

    #[test]
    fn unknown_kind_fails_before_any_remote_call() {
        let conn = deployed();
        let params: ParameterMap = [(
            "X".to_string(),
            ParameterDeclaration::remote(RemoteReference {
                stack: "vpc".into(),
                kind: "export".into(),
                name: None,
            }),
        )]
        .into_iter()
        .collect();
        let calls_before = conn.calls().len();
        assert!(matches!(
            resolve_parameters(&conn, &params),
            Err(ForgeError::BadValueType { kind }) if kind == "export"
        ));
        assert_eq!(conn.calls().len(), calls_before);
    }
}
