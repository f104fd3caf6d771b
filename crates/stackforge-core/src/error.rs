//! Error taxonomy for loading, ordering, resolving and forging stacks.

use std::time::Duration;

use stackforge_connector::ConnectorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    // ─── Definition loading ──────────────────────────────────────────
    #[error("invalid definitions file: {0}")]
    InvalidDefinition(String),

    #[error("definition {definition} not found in {file}")]
    DefinitionNotFound { definition: String, file: String },

    #[error("stack {stack} not found in {definition}")]
    StackNotFound { stack: String, definition: String },

    // ─── Graph ───────────────────────────────────────────────────────
    #[error("stack {stack} requires {dependency}, but it is not defined")]
    MissingDependency { stack: String, dependency: String },

    #[error("stacks {remaining:?} have a circular dependency")]
    CircularDependency { remaining: Vec<String> },

    // ─── Parameters ──────────────────────────────────────────────────
    #[error("value type {kind} is invalid")]
    BadValueType { kind: String },

    #[error("stack {stack} did not have {kind} {name}")]
    ValueNotFound {
        stack: String,
        name: String,
        kind: String,
    },

    // ─── Orchestration ───────────────────────────────────────────────
    #[error("failed to render template for {stack}: {source}")]
    Render {
        stack: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("template for {stack} failed validation: {reason}")]
    TemplateValidation { stack: String, reason: String },

    #[error("could not create {stack}, it already exists in status {status}")]
    StackAlreadyExists { stack: String, status: String },

    #[error("creation of {stack} failed, got status: {status}")]
    StackCreation { stack: String, status: String },

    #[error("deletion of {stack} failed, got status: {status}")]
    StackDeletion { stack: String, status: String },

    #[error("gave up watching {stack} after {elapsed:?} in status {status}")]
    WatchTimeout {
        stack: String,
        status: String,
        elapsed: Duration,
    },

    #[error("watch of {stack} cancelled in status {status}")]
    WatchCancelled { stack: String, status: String },

    #[error("cancelled before {stack} was started")]
    Cancelled { stack: String },

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
