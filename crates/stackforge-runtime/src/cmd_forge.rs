//! `stackforge create` / `stackforge delete`: drive a whole definition.
//!
//! The engine is blocking, so it runs on the blocking pool while the async
//! side waits for either completion or Ctrl-C.

use anyhow::Context;
use stackforge_connector::{
    AwsCliConnector, AwsCliExecutor, KeyValue, MemoryConnector, StackConnector,
};
use stackforge_core::{
    CancellationToken, Definition, DefinitionFile, Forge, ForgeError, SourceKind,
};
use stackforge_render::HandlebarsRenderer;

use crate::cli::ForgeOpts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeAction {
    Create,
    Delete,
}

/// Entry point for `stackforge create` and `stackforge delete`.
pub async fn cmd_forge(opts: ForgeOpts, action: ForgeAction) -> anyhow::Result<()> {
    let file = DefinitionFile::load(&opts.yamlfile)
        .with_context(|| format!("loading {}", opts.yamlfile.display()))?;
    let definition = file.definition(&opts.definition)?.clone();

    let connector = connect(&opts, &definition);
    let renderer = HandlebarsRenderer::for_definition(&definition);
    let cancel = CancellationToken::new();
    let forge =
        Forge::new(connector, renderer, opts.forge_config()).with_cancellation(cancel.clone());

    let mut task = tokio::task::spawn_blocking(move || run(&forge, &definition, action));
    let finished = tokio::select! {
        result = &mut task => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            tracing::warn!("interrupted, cancelling the active watch");
            cancel.cancel();
            task.await
        }
    };
    result.context("forge task panicked")??;
    Ok(())
}

fn run<C: StackConnector>(
    forge: &Forge<C, HandlebarsRenderer>,
    definition: &Definition,
    action: ForgeAction,
) -> Result<(), ForgeError> {
    match action {
        ForgeAction::Create => forge.create_definition(definition),
        ForgeAction::Delete => forge.delete_definition(definition),
    }
}

fn connect(opts: &ForgeOpts, definition: &Definition) -> Box<dyn StackConnector> {
    if opts.noop {
        tracing::info!("--noop: using a simulated control plane");
        return Box::new(dry_run_connector(definition));
    }
    let mut executor = AwsCliExecutor::new(opts.aws_bin.clone());
    if let Some(region) = opts.region(definition) {
        executor = executor.with_region(region);
    }
    if let Some(profile) = &opts.profile {
        executor = executor.with_profile(profile.clone());
    }
    Box::new(AwsCliConnector::new(executor))
}

/// Simulated control plane whose stacks expose every output the definition
/// reads, so cross-stack parameters resolve during a dry run.
fn dry_run_connector(definition: &Definition) -> MemoryConnector {
    let conn = MemoryConnector::new();
    let mut outputs: std::collections::BTreeMap<&str, Vec<KeyValue>> = Default::default();
    for stack in definition.stacks.values() {
        for (name, decl) in stack.parameters.iter() {
            let Some(reference) = decl.reference() else {
                continue;
            };
            if reference.source_kind().ok() != Some(SourceKind::Output) {
                continue;
            }
            let key = reference.value_name(name);
            outputs
                .entry(reference.stack.as_str())
                .or_default()
                .push(KeyValue::new(key, format!("noop-{}-{key}", reference.stack)));
        }
    }
    for (stack, values) in outputs {
        conn.seed_outputs(stack, values);
    }
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    const DEFINITIONS: &str = "
prod:
  template_path: TEMPLATES
  stacks:
    network:
      resources:
        topic: ~
    app:
      parameters:
        TopicArn:
          source: {stack: network, type: output}
      resources:
        topic: ~
";

    fn write_definitions(dir: &Path) -> PathBuf {
        std::fs::write(
            dir.join("topic.yaml"),
            "Type: AWS::SNS::Topic\nProperties:\n  TopicName: t\n",
        )
        .expect("write template");
        let yamlfile = dir.join("defs.yaml");
        std::fs::write(
            &yamlfile,
            DEFINITIONS.replace("TEMPLATES", &dir.display().to_string()),
        )
        .expect("write definitions");
        yamlfile
    }

    fn noop_opts(yamlfile: PathBuf) -> ForgeOpts {
        ForgeOpts {
            yamlfile,
            definition: "prod".into(),
            noop: true,
            poll_interval_secs: 5,
            timeout_secs: Some(60),
            no_resume: false,
            adopt_complete: false,
            aws_bin: "aws".into(),
            region: None,
            profile: None,
        }
    }

    #[test]
    fn dry_run_seeds_referenced_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = DefinitionFile::load(&write_definitions(dir.path())).expect("load");
        let definition = file.definition("prod").expect("prod");
        let conn = dry_run_connector(definition);
        conn.create_stack(
            "network",
            r#"{"Resources":{"topic":{}}}"#,
            &[],
            &[],
        )
        .expect("create");
        conn.describe_stack("network").expect("poll");
        let network = conn.describe_stack("network").expect("settled");
        assert_eq!(network.output("TopicArn"), Some("noop-network-TopicArn"));
    }

    #[tokio::test]
    async fn noop_create_and_delete_run_to_completion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let yamlfile = write_definitions(dir.path());
        cmd_forge(noop_opts(yamlfile.clone()), ForgeAction::Create)
            .await
            .expect("create");
        cmd_forge(noop_opts(yamlfile), ForgeAction::Delete)
            .await
            .expect("delete");
    }

    #[tokio::test]
    async fn unknown_definition_fails_before_connecting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut opts = noop_opts(write_definitions(dir.path()));
        opts.definition = "staging".into();
        let err = cmd_forge(opts, ForgeAction::Create)
            .await
            .expect_err("missing definition");
        assert!(err.to_string().starts_with("definition staging not found"));
    }
}
