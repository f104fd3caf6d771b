//! CLI definition using clap derive.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stackforge_core::{Definition, ForgeConfig, WatchConfig};

#[derive(Parser)]
#[command(
    name = "stackforge",
    about = "Forge CloudFormation stacks from declarative definitions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the rendered template of one stack
    Dump(DumpOpts),
    /// Create every stack of a definition, dependencies first
    Create(ForgeOpts),
    /// Delete every stack of a definition, dependents first
    Delete(ForgeOpts),
}

#[derive(clap::Args)]
pub struct DumpOpts {
    /// The file to read definitions from
    pub yamlfile: PathBuf,
    /// The definition name
    pub definition: String,
    /// The stack name
    pub stack: String,
}

#[derive(clap::Args)]
pub struct ForgeOpts {
    /// The file to read definitions from
    pub yamlfile: PathBuf,
    /// The definition name
    pub definition: String,

    /// Use a simulated control plane instead of AWS
    #[arg(long)]
    pub noop: bool,

    /// Seconds between status polls
    #[arg(long, env = "STACKFORGE_POLL_INTERVAL_SECS", default_value = "5")]
    pub poll_interval_secs: u64,

    /// Give up watching a stack after this many seconds
    #[arg(long, env = "STACKFORGE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Fail on a stack that is already being created instead of watching it
    #[arg(long)]
    pub no_resume: bool,

    /// Skip stacks that already finished creating
    #[arg(long)]
    pub adopt_complete: bool,

    /// aws CLI executable
    #[arg(long, env = "STACKFORGE_AWS_BIN", default_value = "aws")]
    pub aws_bin: String,

    /// AWS region (overrides the definition's region)
    #[arg(long)]
    pub region: Option<String>,

    /// AWS named profile
    #[arg(long)]
    pub profile: Option<String>,
}

impl ForgeOpts {
    pub fn forge_config(&self) -> ForgeConfig {
        let poll_interval = if self.noop {
            Duration::ZERO
        } else {
            Duration::from_secs(self.poll_interval_secs)
        };
        let mut watch = WatchConfig::default().with_poll_interval(poll_interval);
        if let Some(secs) = self.timeout_secs {
            watch = watch.with_max_wait(Duration::from_secs(secs));
        }
        ForgeConfig::default()
            .with_resume_in_progress(!self.no_resume)
            .with_adopt_complete(self.adopt_complete)
            .with_watch(watch)
    }

    pub fn region<'a>(&'a self, definition: &'a Definition) -> Option<&'a str> {
        self.region.as_deref().or(definition.region.as_deref())
    }
}
