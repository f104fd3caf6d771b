//! Orchestrator: creates and deletes whole definitions one stack at a time.
//!
//! Strictly sequential. The first failure aborts the run and nothing already
//! created is rolled back.

use stackforge_connector::{ConnectorError, StackConnector, status};

use crate::definition::{Definition, StackDefinition, Variables};
use crate::error::{ForgeError, Result};
use crate::graph::{deletion_order, order_stacks};
use crate::parameters::resolve_parameters;
use crate::render::TemplateRenderer;
use crate::watcher::{
    CancellationToken, Pacer, StackWatcher, ThreadPacer, TracingObserver, WatchConfig,
    WatchObserver, WatchOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeConfig {
    /// Watch a stack found mid-creation instead of rejecting it.
    pub resume_in_progress: bool,
    /// Treat a stack that already finished creating as done.
    pub adopt_complete: bool,
    pub capabilities: Vec<String>,
    pub watch: WatchConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            resume_in_progress: true,
            adopt_complete: false,
            capabilities: vec!["CAPABILITY_IAM".to_string()],
            watch: WatchConfig::default(),
        }
    }
}

impl ForgeConfig {
    #[must_use]
    pub fn with_resume_in_progress(mut self, resume: bool) -> Self {
        self.resume_in_progress = resume;
        self
    }

    #[must_use]
    pub fn with_adopt_complete(mut self, adopt: bool) -> Self {
        self.adopt_complete = adopt;
        self
    }

    #[must_use]
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }
}

/// Drives stacks to completion against one control plane.
pub struct Forge<C: StackConnector, R: TemplateRenderer> {
    connector: C,
    renderer: R,
    config: ForgeConfig,
    observer: Box<dyn WatchObserver>,
    pacer: Box<dyn Pacer>,
    cancel: CancellationToken,
}

impl<C: StackConnector, R: TemplateRenderer> Forge<C, R> {
    pub fn new(connector: C, renderer: R, config: ForgeConfig) -> Self {
        Self {
            connector,
            renderer,
            config,
            observer: Box::new(TracingObserver),
            pacer: Box::new(ThreadPacer),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl WatchObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    #[must_use]
    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    /// Share a token whose cancellation aborts the active watch.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn watch(&self, stack: &str, continue_statuses: &[&str]) -> Result<WatchOutcome> {
        StackWatcher::new(
            &self.connector,
            &self.config.watch,
            self.observer.as_ref(),
            self.pacer.as_ref(),
            &self.cancel,
        )
        .watch(stack, continue_statuses)
    }

    fn ensure_not_cancelled(&self, stack: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled {
                stack: stack.to_string(),
            });
        }
        Ok(())
    }

    fn current_status(&self, stack: &str) -> Result<Option<String>> {
        match self.connector.describe_stack(stack) {
            Ok(remote) => Ok(Some(remote.status)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ─── Creation ────────────────────────────────────────────────────

    /// Create one stack and wait for it to finish.
    ///
    /// Parameters are resolved against already-deployed stacks, so every
    /// dependency must exist before this is called.
    pub fn create_stack(
        &self,
        name: &str,
        stack: &StackDefinition,
        shared: &Variables,
    ) -> Result<()> {
        self.ensure_not_cancelled(name)?;
        let parameters = resolve_parameters(&self.connector, &stack.parameters)?;
        let body = render(&self.renderer, name, stack, shared)?;

        if let Err(e) = self.connector.validate_template(&body) {
            return Err(match e {
                ConnectorError::Remote { detail, .. } => ForgeError::TemplateValidation {
                    stack: name.to_string(),
                    reason: detail,
                },
                other => other.into(),
            });
        }

        match self.current_status(name)?.as_deref() {
            None => {
                tracing::info!("creating stack {name} with {} parameters", parameters.len());
                self.connector
                    .create_stack(name, &body, &parameters, &self.config.capabilities)?;
            }
            Some(status::CREATE_IN_PROGRESS) if self.config.resume_in_progress => {
                tracing::info!("stack {name} is already being created, watching it");
            }
            Some(status::CREATE_COMPLETE) if self.config.adopt_complete => {
                tracing::info!("stack {name} already exists, skipping");
                return Ok(());
            }
            Some(existing) => {
                return Err(ForgeError::StackAlreadyExists {
                    stack: name.to_string(),
                    status: existing.to_string(),
                });
            }
        }

        let outcome = self.watch(name, &[status::CREATE_IN_PROGRESS])?;
        if !outcome.is(status::CREATE_COMPLETE) {
            return Err(ForgeError::StackCreation {
                stack: name.to_string(),
                status: outcome.to_string(),
            });
        }
        tracing::info!("stack {name} created");
        Ok(())
    }

    /// Create every stack of `definition`, dependencies first.
    pub fn create_definition(&self, definition: &Definition) -> Result<()> {
        let order = order_stacks(&definition.stacks)?;
        tracing::info!(
            "creating definition {} ({} stacks)",
            definition.name,
            order.len()
        );
        for (name, stack) in order {
            self.create_stack(name, stack, &definition.variables)?;
        }
        Ok(())
    }

    // ─── Deletion ────────────────────────────────────────────────────

    /// Delete one stack and wait until it is gone. An absent stack is
    /// already deleted.
    pub fn delete_stack(&self, name: &str) -> Result<()> {
        self.ensure_not_cancelled(name)?;
        let Some(current) = self.current_status(name)? else {
            tracing::info!("stack {name} does not exist, nothing to delete");
            return Ok(());
        };

        if current != status::DELETE_COMPLETE && current != status::DELETE_IN_PROGRESS {
            tracing::info!("deleting stack {name} (was {current})");
            self.connector.delete_stack(name)?;
        }
        if current == status::DELETE_COMPLETE {
            return Ok(());
        }

        let outcome = self.watch(name, &[status::DELETE_IN_PROGRESS])?;
        match outcome {
            WatchOutcome::Gone => {}
            settled if settled.is(status::DELETE_COMPLETE) => {}
            settled => {
                return Err(ForgeError::StackDeletion {
                    stack: name.to_string(),
                    status: settled.to_string(),
                });
            }
        }
        tracing::info!("stack {name} deleted");
        Ok(())
    }

    /// Delete every stack of `definition`, dependents first.
    pub fn delete_definition(&self, definition: &Definition) -> Result<()> {
        let order = deletion_order(&definition.stacks)?;
        tracing::info!(
            "deleting definition {} ({} stacks)",
            definition.name,
            order.len()
        );
        for (name, _) in order {
            self.delete_stack(name)?;
        }
        Ok(())
    }
}

fn render<R: TemplateRenderer>(
    renderer: &R,
    name: &str,
    stack: &StackDefinition,
    shared: &Variables,
) -> Result<String> {
    renderer
        .render_template_body(stack, shared)
        .map_err(|e| ForgeError::Render {
            stack: name.to_string(),
            source: Box::new(e),
        })
}

/// Render one stack of `definition` without touching the control plane.
pub fn dump_stack<R: TemplateRenderer>(
    renderer: &R,
    definition: &Definition,
    stack: &str,
) -> Result<String> {
    let stack_def = definition.stack(stack)?;
    render(renderer, stack, stack_def, &definition.variables)
}
