//! Connector backed by the `aws cloudformation` command line tool.
//!
//! Credentials, signing and the wire protocol stay inside the CLI; this
//! module only builds argument lists and decodes the JSON it prints.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::connector::StackConnector;
use crate::error::ConnectorError;
use crate::remote::{KeyValue, RemoteStack, StackEvent};

/// Trait for executing `aws` commands. Enables mock injection for testing.
pub trait CommandRunner: Send + Sync {
    /// Run with `args` and return stdout. A non-zero exit maps to
    /// [`ConnectorError::Remote`] carrying stderr.
    fn run(&self, args: &[&str]) -> Result<String, ConnectorError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, ConnectorError> {
        (**self).run(args)
    }
}

/// Real executor using `std::process::Command`.
pub struct AwsCliExecutor {
    aws_bin: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCliExecutor {
    pub fn new(aws_bin: impl Into<String>) -> Self {
        Self {
            aws_bin: aws_bin.into(),
            region: None,
            profile: None,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

impl Default for AwsCliExecutor {
    fn default() -> Self {
        Self::new("aws")
    }
}

impl CommandRunner for AwsCliExecutor {
    fn run(&self, args: &[&str]) -> Result<String, ConnectorError> {
        let mut cmd = std::process::Command::new(&self.aws_bin);
        if let Some(ref region) = self.region {
            cmd.args(["--region", region]);
        }
        if let Some(ref profile) = self.profile {
            cmd.args(["--profile", profile]);
        }
        cmd.args(["--output", "json"]);
        cmd.args(args);
        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let operation = args.get(1).copied().unwrap_or("aws");
            return Err(ConnectorError::remote(
                operation,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ─── Response shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    stack_name: String,
    stack_status: String,
    #[serde(default)]
    outputs: Vec<OutputDescription>,
    #[serde(default)]
    parameters: Vec<ParameterDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OutputDescription {
    output_key: String,
    output_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterDescription {
    parameter_key: String,
    #[serde(default)]
    parameter_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEventsResponse {
    #[serde(default)]
    stack_events: Vec<EventDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventDescription {
    event_id: String,
    timestamp: DateTime<Utc>,
    logical_resource_id: String,
    physical_resource_id: Option<String>,
    resource_type: String,
    resource_status: String,
    resource_status_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResourceResponse {
    stack_resource_detail: ResourceDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceDetail {
    physical_resource_id: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterArg<'a> {
    parameter_key: &'a str,
    parameter_value: &'a str,
}

fn decode<'a, T: Deserialize<'a>>(operation: &str, raw: &'a str) -> Result<T, ConnectorError> {
    serde_json::from_str(raw).map_err(|e| ConnectorError::Parse {
        operation: operation.to_string(),
        detail: e.to_string(),
    })
}

/// Map the CLI's "Stack with id X does not exist" failure to `NotFound`.
fn classify(stack: &str, err: ConnectorError) -> ConnectorError {
    match err {
        ConnectorError::Remote { ref detail, .. } if detail.contains("does not exist") => {
            ConnectorError::not_found(stack)
        }
        other => other,
    }
}

// ─── Connector ───────────────────────────────────────────────────────

/// [`StackConnector`] that shells out through a [`CommandRunner`].
pub struct AwsCliConnector<R: CommandRunner = AwsCliExecutor> {
    runner: R,
}

impl<R: CommandRunner> AwsCliConnector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn cloudformation(&self, stack: &str, args: &[&str]) -> Result<String, ConnectorError> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("cloudformation");
        full.extend_from_slice(args);
        self.runner.run(&full).map_err(|e| classify(stack, e))
    }
}

impl<R: CommandRunner> StackConnector for AwsCliConnector<R> {
    fn describe_stack(&self, stack: &str) -> Result<RemoteStack, ConnectorError> {
        let raw = self.cloudformation(stack, &["describe-stacks", "--stack-name", stack])?;
        let response: DescribeStacksResponse = decode("describe-stacks", &raw)?;
        let described = response
            .stacks
            .into_iter()
            .next()
            .ok_or_else(|| ConnectorError::not_found(stack))?;
        Ok(RemoteStack {
            name: described.stack_name,
            status: described.stack_status,
            outputs: described
                .outputs
                .into_iter()
                .map(|o| KeyValue::new(o.output_key, o.output_value))
                .collect(),
            parameters: described
                .parameters
                .into_iter()
                .map(|p| KeyValue::new(p.parameter_key, p.parameter_value))
                .collect(),
        })
    }

    fn describe_events(&self, stack: &str) -> Result<Vec<StackEvent>, ConnectorError> {
        let raw = self.cloudformation(stack, &["describe-stack-events", "--stack-name", stack])?;
        let response: DescribeEventsResponse = decode("describe-stack-events", &raw)?;
        Ok(response
            .stack_events
            .into_iter()
            .map(|e| StackEvent {
                event_id: e.event_id,
                timestamp: e.timestamp,
                logical_resource_id: e.logical_resource_id,
                physical_resource_id: e.physical_resource_id,
                resource_type: e.resource_type,
                resource_status: e.resource_status,
                status_reason: e.resource_status_reason,
            })
            .collect())
    }

    fn create_stack(
        &self,
        stack: &str,
        template_body: &str,
        parameters: &[(String, String)],
        capabilities: &[String],
    ) -> Result<(), ConnectorError> {
        let encoded_parameters;
        let mut args = vec![
            "create-stack",
            "--stack-name",
            stack,
            "--template-body",
            template_body,
        ];
        if !parameters.is_empty() {
            let param_args: Vec<ParameterArg<'_>> = parameters
                .iter()
                .map(|(key, value)| ParameterArg {
                    parameter_key: key,
                    parameter_value: value,
                })
                .collect();
            encoded_parameters = serde_json::to_string(&param_args).map_err(|e| {
                ConnectorError::Parse {
                    operation: "create-stack".to_string(),
                    detail: e.to_string(),
                }
            })?;
            args.push("--parameters");
            args.push(&encoded_parameters);
        }
        if !capabilities.is_empty() {
            args.push("--capabilities");
            args.extend(capabilities.iter().map(String::as_str));
        }
        self.cloudformation(stack, &args)?;
        Ok(())
    }

    fn delete_stack(&self, stack: &str) -> Result<(), ConnectorError> {
        self.cloudformation(stack, &["delete-stack", "--stack-name", stack])?;
        Ok(())
    }

    fn validate_template(&self, template_body: &str) -> Result<(), ConnectorError> {
        // Not stack-scoped: every failure stays `Remote`.
        self.runner.run(&[
            "cloudformation",
            "validate-template",
            "--template-body",
            template_body,
        ])?;
        Ok(())
    }

    fn describe_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let result = self.runner.run(&[
            "cloudformation",
            "describe-stack-resource",
            "--stack-name",
            stack,
            "--logical-resource-id",
            logical_id,
        ]);
        let raw = match result {
            Ok(raw) => raw,
            // "Resource X does not exist for stack Y": the stack is there, the resource is not.
            Err(ConnectorError::Remote { ref detail, .. })
                if detail.contains("does not exist for stack") =>
            {
                return Ok(None);
            }
            Err(e) => return Err(classify(stack, e)),
        };
        let response: DescribeResourceResponse = decode("describe-stack-resource", &raw)?;
        Ok(Some(response.stack_resource_detail.physical_resource_id))
    }
}
