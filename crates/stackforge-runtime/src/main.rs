//! stackforge: create and delete dependent CloudFormation stacks from
//! declarative YAML definitions.

use clap::Parser;

mod cli;
mod cmd_dump;
mod cmd_forge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("STACKFORGE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Dump(opts) => {
            let body = cmd_dump::cmd_dump(&opts)?;
            println!("{body}");
        }
        cli::Command::Create(opts) => {
            tracing::info!("stackforge create {}", opts.definition);
            cmd_forge::cmd_forge(opts, cmd_forge::ForgeAction::Create).await?;
        }
        cli::Command::Delete(opts) => {
            tracing::info!("stackforge delete {}", opts.definition);
            cmd_forge::cmd_forge(opts, cmd_forge::ForgeAction::Delete).await?;
        }
    }

    Ok(())
}
