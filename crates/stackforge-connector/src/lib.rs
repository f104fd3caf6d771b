//! stackforge-connector: remote control plane IO boundary.
//! Provides the connector trait, the observed remote stack model, an
//! `aws` CLI backed connector and an in-memory simulated control plane.
//! No orchestration logic here, only the IO boundary.

pub mod aws_cli;
pub mod connector;
pub mod error;
pub mod memory;
pub mod remote;

pub use aws_cli::{AwsCliConnector, AwsCliExecutor, CommandRunner};
pub use connector::StackConnector;
pub use error::ConnectorError;
pub use memory::{ConnectorCall, MemoryConnector};
pub use remote::{KeyValue, RemoteStack, StackEvent, status};
