#![allow(clippy::result_large_err)]

use crate::core::error::{ActionError, AppError};
use crate::core::pipeline::actions::{self, ActionContext, ActionOutcome, CustomActionRegistry};
use crate::core::pipeline::artifacts::ArtifactStore;
use crate::core::pipeline::context::RunContext;
use crate::core::pipeline::document::Document;
use crate::core::pipeline::render::{RenderError, RenderSession};
use crate::core::pipeline::schema::{ActionSpec, Step};
use crate::core::pipeline::validation::{Diagnostics, Validator};
use std::time::Duration;

/// Relative path of a per-step artifact, e.g. `steps/step-3-log.txt`.
pub fn step_artifact(number: usize, suffix: &str) -> String {
    format!("steps/step-{}{}", number, suffix)
}

/// What one executed step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// One-based position in the step list; skipped steps leave gaps.
    pub number: usize,
    pub name: String,
    pub succeeded: usize,
    pub failed: usize,
    pub diagnostics: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerSummary {
    pub steps: Vec<StepReport>,
}

impl RunnerSummary {
    pub fn failed_actions(&self) -> usize {
        self.steps.iter().map(|step| step.failed).sum()
    }
}

/// Print the one-line validation result, and every finding in verbose mode.
pub fn print_validation(diagnostics: &Diagnostics, verbose: bool) {
    if diagnostics.is_empty() {
        println!("\tValidation: PASS");
        return;
    }
    println!("\tValidation: FAIL ({} findings)", diagnostics.len());
    if verbose {
        for diagnostic in diagnostics.iter() {
            println!("\t\t{}", diagnostic);
        }
    }
}

/// Executes steps against one document, persisting a snapshot after each step.
pub struct StepRunner<'a> {
    validator: &'a dyn Validator,
    store: &'a dyn ArtifactStore,
    custom: &'a CustomActionRegistry,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        validator: &'a dyn Validator,
        store: &'a dyn ArtifactStore,
        custom: &'a CustomActionRegistry,
    ) -> Self {
        Self {
            validator,
            store,
            custom,
        }
    }

    /// Run every runnable step in order. Action failures are reported and skipped;
    /// only artifact write failures end the run early.
    pub async fn run(
        &self,
        steps: &[Step],
        document: &mut Document,
        run: &mut RunContext,
        session: &mut dyn RenderSession,
    ) -> Result<RunnerSummary, AppError> {
        let mut summary = RunnerSummary::default();
        for (index, step) in steps.iter().enumerate() {
            if !step.is_runnable() {
                tracing::debug!(step = %step.name, skip = step.skip, "step not runnable");
                continue;
            }
            let number = index + 1;
            println!("Step {}: {}", number, step.name);
            let report = self.run_step(number, step, document, run, session).await?;
            summary.steps.push(report);
        }
        Ok(summary)
    }

    async fn run_step(
        &self,
        number: usize,
        step: &Step,
        document: &mut Document,
        run: &mut RunContext,
        session: &mut dyn RenderSession,
    ) -> Result<StepReport, AppError> {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut optimized_css = None;
        let mut unused_css = None;

        for spec in &step.actions {
            match self.run_action(spec, document, run, session).await {
                Ok(outcome) => {
                    succeeded += 1;
                    println!("\t{}: {}", spec.label(), outcome.message);
                    if outcome.optimized_css.is_some() {
                        optimized_css = outcome.optimized_css;
                    }
                    if outcome.unused_css.is_some() {
                        unused_css = outcome.unused_css;
                    }
                }
                Err(err) => {
                    failed += 1;
                    report_action_error(spec, &err, run.verbose);
                }
            }
        }

        let html = document.to_pretty_html();
        self.store
            .write(&step_artifact(number, ".html"), html.as_bytes())?;
        if let Some(css) = optimized_css {
            self.store
                .write(&step_artifact(number, "-optimized-css.css"), css.as_bytes())?;
        }
        if let Some(css) = unused_css {
            self.store
                .write(&step_artifact(number, "-unused-css.css"), css.as_bytes())?;
        }

        if let Err(err) = session.set_content(&html).await {
            tracing::warn!(step = number, error = %err, "could not load step output into the render session");
        }
        capture_screenshot(session, self.store, &step_artifact(number, ".png")).await?;

        match self.validator.validate(&html).await {
            Ok(diagnostics) => run.diagnostics = diagnostics,
            Err(err) => tracing::warn!(step = number, error = %err, "validation failed, keeping previous findings"),
        }
        self.store.write(
            &step_artifact(number, "-log.txt"),
            run.diagnostics.to_log().as_bytes(),
        )?;
        print_validation(&run.diagnostics, run.verbose);

        Ok(StepReport {
            number,
            name: step.name.clone(),
            succeeded,
            failed,
            diagnostics: run.diagnostics.len(),
        })
    }

    /// Substitute, wait, execute, then reformat, reload the session and revalidate so the
    /// next action sees the current markup and findings. A failed action leaves both the
    /// tree and the findings as they were.
    async fn run_action(
        &self,
        spec: &ActionSpec,
        document: &mut Document,
        run: &mut RunContext,
        session: &mut dyn RenderSession,
    ) -> Result<ActionOutcome, ActionError> {
        let spec = run.env.apply(spec)?;
        if let Some(wait) = spec.wait_after_loaded {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }

        let outcome = {
            let mut ctx = ActionContext {
                run: &*run,
                session: &mut *session,
                custom: self.custom,
            };
            actions::execute(&spec, document, &mut ctx).await?
        };

        let html = document.reformat();
        if let Err(err) = session.set_content(&html).await {
            tracing::warn!(action = spec.label(), error = %err, "could not refresh the render session");
        }
        match self.validator.validate(&html).await {
            Ok(diagnostics) => run.diagnostics = diagnostics,
            Err(err) => tracing::warn!(action = spec.label(), error = %err, "revalidation failed"),
        }
        Ok(outcome)
    }
}

fn report_action_error(spec: &ActionSpec, err: &ActionError, verbose: bool) {
    if verbose {
        println!("\t{}: Error: {:?}", spec.label(), err);
    } else {
        println!("\t{}: Error: {}", spec.label(), err);
    }
    tracing::warn!(
        action = spec.label(),
        kind = spec.action.kind(),
        code = err.code(),
        error = %err,
        "action failed"
    );
}

/// Full-page screenshot into `relative`. Backends without rasterization are skipped.
pub(crate) async fn capture_screenshot(
    session: &mut dyn RenderSession,
    store: &dyn ArtifactStore,
    relative: &str,
) -> Result<Option<Vec<u8>>, AppError> {
    match session.screenshot(true).await {
        Ok(png) => {
            store.write(relative, &png)?;
            Ok(Some(png))
        }
        Err(RenderError::Unsupported(what)) => {
            tracing::debug!(artifact = relative, what, "screenshot not supported by this render provider");
            Ok(None)
        }
        Err(err) => {
            tracing::warn!(artifact = relative, error = %err, "screenshot failed");
            Ok(None)
        }
    }
}
