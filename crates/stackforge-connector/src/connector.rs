//! StackConnector trait: the only way the engine talks to the control plane.

use crate::error::ConnectorError;
use crate::remote::{RemoteStack, StackEvent};

/// Operations against the remote control plane. Enables mock injection for testing.
///
/// Implementations must report a missing stack as [`ConnectorError::NotFound`]
/// from `describe_stack`, `describe_events` and `describe_resource`.
pub trait StackConnector: Send + Sync {
    fn describe_stack(&self, stack: &str) -> Result<RemoteStack, ConnectorError>;

    /// Full event history, newest first.
    fn describe_events(&self, stack: &str) -> Result<Vec<StackEvent>, ConnectorError>;

    fn create_stack(
        &self,
        stack: &str,
        template_body: &str,
        parameters: &[(String, String)],
        capabilities: &[String],
    ) -> Result<(), ConnectorError>;

    fn delete_stack(&self, stack: &str) -> Result<(), ConnectorError>;

    fn validate_template(&self, template_body: &str) -> Result<(), ConnectorError>;

    /// Physical identifier of a logical resource inside a stack, `None` when
    /// the stack exists but has no such resource.
    fn describe_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ConnectorError>;
}

impl<T: StackConnector + ?Sized> StackConnector for &T {
    fn describe_stack(&self, stack: &str) -> Result<RemoteStack, ConnectorError> {
        (**self).describe_stack(stack)
    }

    fn describe_events(&self, stack: &str) -> Result<Vec<StackEvent>, ConnectorError> {
        (**self).describe_events(stack)
    }

    fn create_stack(
        &self,
        stack: &str,
        template_body: &str,
        parameters: &[(String, String)],
        capabilities: &[String],
    ) -> Result<(), ConnectorError> {
        (**self).create_stack(stack, template_body, parameters, capabilities)
    }

    fn delete_stack(&self, stack: &str) -> Result<(), ConnectorError> {
        (**self).delete_stack(stack)
    }

    fn validate_template(&self, template_body: &str) -> Result<(), ConnectorError> {
        (**self).validate_template(template_body)
    }

    fn describe_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ConnectorError> {
        (**self).describe_resource(stack, logical_id)
    }
}

impl<T: StackConnector + ?Sized> StackConnector for Box<T> {
    fn describe_stack(&self, stack: &str) -> Result<RemoteStack, ConnectorError> {
        (**self).describe_stack(stack)
    }

    fn describe_events(&self, stack: &str) -> Result<Vec<StackEvent>, ConnectorError> {
        (**self).describe_events(stack)
    }

    fn create_stack(
        &self,
        stack: &str,
        template_body: &str,
        parameters: &[(String, String)],
        capabilities: &[String],
    ) -> Result<(), ConnectorError> {
        (**self).create_stack(stack, template_body, parameters, capabilities)
    }

    fn delete_stack(&self, stack: &str) -> Result<(), ConnectorError> {
        (**self).delete_stack(stack)
    }

    fn validate_template(&self, template_body: &str) -> Result<(), ConnectorError> {
        (**self).validate_template(template_body)
    }

    fn describe_resource(
        &self,
        stack: &str,
        logical_id: &str,
    ) -> Result<Option<String>, ConnectorError> {
        (**self).describe_resource(stack, logical_id)
    }
}
