//! `stackforge dump`: render one stack without touching AWS.

use anyhow::Context;
use stackforge_core::{DefinitionFile, dump_stack};
use stackforge_render::HandlebarsRenderer;

use crate::cli::DumpOpts;

/// The rendered template body of the requested stack.
pub fn cmd_dump(opts: &DumpOpts) -> anyhow::Result<String> {
    let file = DefinitionFile::load(&opts.yamlfile)
        .with_context(|| format!("loading {}", opts.yamlfile.display()))?;
    let definition = file.definition(&opts.definition)?;
    let renderer = HandlebarsRenderer::for_definition(definition);
    Ok(dump_stack(&renderer, definition, &opts.stack)?)
}
