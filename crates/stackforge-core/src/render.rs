//! Renderer seam: turns a stack definition into the serialized template body
//! handed to the control plane.

use crate::definition::{StackDefinition, Variables};

/// Produces a stack's template body. The engine treats the result as opaque
/// text and never post-processes it.
pub trait TemplateRenderer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `shared` holds the definition-level variables; stack and resource
    /// variables take precedence over them.
    fn render_template_body(
        &self,
        stack: &StackDefinition,
        shared: &Variables,
    ) -> Result<String, Self::Error>;
}

impl<T: TemplateRenderer + ?Sized> TemplateRenderer for &T {
    type Error = T::Error;

    fn render_template_body(
        &self,
        stack: &StackDefinition,
        shared: &Variables,
    ) -> Result<String, Self::Error> {
        (**self).render_template_body(stack, shared)
    }
}
