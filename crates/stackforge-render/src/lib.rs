//! stackforge-render: turns stack definitions into template documents.
//! Resource templates are handlebars files that render to YAML; the
//! assembled document is serialized as JSON.

pub mod document;
pub mod error;
pub mod renderer;

pub use document::{TEMPLATE_FORMAT_VERSION, parameters_section, stringify_scalars};
pub use error::RenderError;
pub use renderer::{HandlebarsRenderer, TemplateSource};
