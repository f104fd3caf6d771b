//! stackforge-core: stack orchestration engine.
//! Orders a definition's stacks by dependency, resolves cross-stack
//! parameters, and drives each remote mutation to completion through the
//! status watcher. All remote IO goes through `StackConnector`.

pub mod definition;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod parameters;
pub mod render;
pub mod watcher;

pub use definition::{
    Definition, DefinitionFile, ParameterDeclaration, ParameterMap, RemoteReference,
    SourceKind, StackDefinition, Variables,
};
pub use error::ForgeError;
pub use graph::{DependencyGraph, deletion_order, order_stacks};
pub use orchestrator::{Forge, ForgeConfig, dump_stack};
pub use parameters::resolve_parameters;
pub use render::TemplateRenderer;
pub use watcher::{
    CancellationToken, EventCursor, Pacer, StackWatcher, ThreadPacer, TracingObserver,
    WatchConfig, WatchObserver, WatchOutcome,
};

pub use stackforge_connector as connector;
