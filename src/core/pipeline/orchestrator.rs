#![allow(clippy::result_large_err)]

//! End-to-end conversion of one page.
//!
//! Load the page, snapshot it as step 0, run the steps, write the final document and
//! optionally compare before/after screenshots. The render session and preview server
//! are released on every exit path.

use crate::core::error::AppError;
use crate::core::pipeline::actions::CustomActionRegistry;
use crate::core::pipeline::artifacts::{ArtifactStore, FsArtifactStore};
use crate::core::pipeline::compare::{
    self, CompareOptions, ComparisonError, DEFAULT_PASS_RATIO,
};
use crate::core::pipeline::context::RunContext;
use crate::core::pipeline::document::Document;
use crate::core::pipeline::env::{output_name_for, EnvVars};
use crate::core::pipeline::render::{
    device_profile, DeviceProfile, PreviewServer, RenderProvider, RenderSession, DEFAULT_DEVICE,
};
use crate::core::pipeline::runner::{
    capture_screenshot, print_validation, step_artifact, StepReport, StepRunner,
};
use crate::core::pipeline::schema::Step;
use crate::core::pipeline::validation::{Diagnostics, Validator};
use crate::core::pipeline::watermark::add_watermark;
use crate::core::types::{ErrorCategory, RunStatus};
use std::path::PathBuf;

pub const FINAL_HTML: &str = "output-final.html";
pub const FINAL_PNG: &str = "output-final.png";
pub const FINAL_LOG: &str = "output-final-log.txt";
pub const DIFFERENCE_PNG: &str = "output-difference.png";
pub const REPLACEMENT_PNG: &str = "output-replace.png";
pub const REPLACEMENT_HTML: &str = "output-replace.html";

/// Settings for converting one URL.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub url: String,
    pub output_root: PathBuf,
    /// Subdirectory under `output_root`; derived from the URL when unset.
    pub output_name: Option<String>,
    pub device: DeviceProfile,
    pub custom_host: Option<String>,
    pub verbose: bool,
    pub watermark: bool,
    /// Serve the output directory locally on this port; `None` disables the server.
    pub preview_port: Option<u16>,
    pub compare: bool,
    pub compare_options: CompareOptions,
    pub pass_ratio: f64,
}

impl RunOptions {
    pub fn new(url: impl Into<String>) -> Self {
        let device = device_profile(DEFAULT_DEVICE).unwrap_or(DeviceProfile {
            name: DEFAULT_DEVICE,
            width: 411,
            height: 731,
            scale_factor: 2.625,
            mobile: true,
            user_agent: "",
        });
        Self {
            url: url.into(),
            output_root: PathBuf::from("output"),
            output_name: None,
            device,
            custom_host: None,
            verbose: false,
            watermark: true,
            preview_port: None,
            compare: false,
            compare_options: CompareOptions::default(),
            pass_ratio: DEFAULT_PASS_RATIO,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        let name = self
            .output_name
            .clone()
            .unwrap_or_else(|| output_name_for(&self.url));
        self.output_root.join(name)
    }
}

/// Result of one run. Failures are carried, not returned, so callers always see a status.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub output_dir: PathBuf,
    pub steps: Vec<StepReport>,
    pub diagnostics: Diagnostics,
    /// Mismatch percentage of the visual comparison, when one ran.
    pub mismatch_percent: Option<f64>,
    pub error: Option<AppError>,
}

#[derive(Debug, Default)]
struct Progress {
    steps: Vec<StepReport>,
    diagnostics: Diagnostics,
    mismatch_percent: Option<f64>,
}

pub struct Orchestrator<'a> {
    provider: &'a dyn RenderProvider,
    validator: &'a dyn Validator,
    custom: &'a CustomActionRegistry,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        provider: &'a dyn RenderProvider,
        validator: &'a dyn Validator,
        custom: &'a CustomActionRegistry,
    ) -> Self {
        Self {
            provider,
            validator,
            custom,
        }
    }

    /// Convert `options.url` and print the terminal status line.
    pub async fn run(&self, steps: &[Step], options: &RunOptions) -> RunOutcome {
        let output_dir = options.output_dir();
        let mut progress = Progress::default();
        let result = self.execute(steps, options, &mut progress).await;

        let (status, error) = match result {
            Ok(()) => (RunStatus::Complete, None),
            Err(err) => {
                if options.verbose {
                    tracing::error!(error = ?err, url = %options.url, "run failed");
                } else {
                    tracing::error!(code = %err.code, url = %options.url, "{}", err.message);
                }
                (RunStatus::CompleteWithErrors, Some(err))
            }
        };
        println!("{}", status);

        RunOutcome {
            status,
            output_dir,
            steps: progress.steps,
            diagnostics: progress.diagnostics,
            mismatch_percent: progress.mismatch_percent,
            error,
        }
    }

    async fn execute(
        &self,
        steps: &[Step],
        options: &RunOptions,
        progress: &mut Progress,
    ) -> Result<(), AppError> {
        if options.url.trim().is_empty() {
            return Err(AppError::new(ErrorCategory::ConfigurationError, "Missing url.")
                .with_code("AMP-CFG-001"));
        }
        let env = EnvVars::from_url(&options.url, options.custom_host.as_deref())?;
        println!("Url: {}", options.url);
        println!("Domain: {}", env.get("$DOMAIN").unwrap_or_default());

        let store = FsArtifactStore::prepare(options.output_dir())?;
        tracing::info!(output = %store.root().display(), provider = self.provider.name(), "starting run");

        println!("Step 0: loading page.");
        let mut session = self.provider.open(&options.url, &options.device).await?;
        let mut server = None;

        let result = self
            .drive(steps, options, env, &store, session.as_mut(), &mut server, progress)
            .await;

        if let Some(server) = server.take() {
            server.stop().await;
            println!("Local server closed!");
        }
        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "render session did not close cleanly");
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        steps: &[Step],
        options: &RunOptions,
        env: EnvVars,
        store: &FsArtifactStore,
        session: &mut dyn RenderSession,
        server: &mut Option<PreviewServer>,
        progress: &mut Progress,
    ) -> Result<(), AppError> {
        let mut run = RunContext::new(options.url.clone(), env).with_verbose(options.verbose);
        let content = session.content().await?;
        run.body_dimensions = match session.body_dimensions().await {
            Ok(dimensions) => Some(dimensions),
            Err(err) => {
                tracing::debug!(error = %err, "body dimensions unavailable");
                None
            }
        };
        run.styles = session.take_stylesheets().into_iter().collect();
        tracing::debug!(stylesheets = run.styles.len(), "captured stylesheets");

        run.diagnostics = self.validator.validate(&content).await.map_err(|err| {
            err.with_context("initial validation of the loaded page")
        })?;
        store.write(&step_artifact(0, ".html"), content.as_bytes())?;
        let before_png = capture_screenshot(session, store, &step_artifact(0, ".png")).await?;
        store.write(&step_artifact(0, "-log.txt"), run.diagnostics.to_log().as_bytes())?;
        print_validation(&run.diagnostics, run.verbose);

        let mut document = Document::parse(&content);
        document.reformat();

        if let Some(port) = options.preview_port {
            match PreviewServer::start(store.root(), port).await {
                Ok(started) => {
                    println!("Local server started!");
                    let target = started.url_for(&step_artifact(0, ".html"));
                    if let Err(err) = session.goto(&target).await {
                        tracing::warn!(error = %err, "Could not connect to local server");
                    }
                    *server = Some(started);
                }
                Err(err) => tracing::warn!(error = %err, "Could not start local server"),
            }
        }

        let runner = StepRunner::new(self.validator, store, self.custom);
        let summary = runner.run(steps, &mut document, &mut run, session).await?;
        progress.steps = summary.steps;

        let mut html = document.to_pretty_html();
        if options.watermark {
            html = add_watermark(&html);
        }
        store.write(FINAL_HTML, html.as_bytes())?;
        if let Err(err) = session.set_content(&html).await {
            tracing::warn!(error = %err, "could not load final output into the render session");
        }
        let after_png = capture_screenshot(session, store, FINAL_PNG).await?;

        println!("Final validation:");
        match self.validator.validate(&html).await {
            Ok(diagnostics) => run.diagnostics = diagnostics,
            Err(err) => tracing::warn!(error = %err, "final validation failed, keeping last findings"),
        }
        store.write(FINAL_LOG, run.diagnostics.to_log().as_bytes())?;
        print_validation(&run.diagnostics, run.verbose);
        progress.diagnostics = run.diagnostics.clone();

        if options.compare {
            match self
                .compare_outputs(options, &run, store, session, before_png, after_png)
                .await
            {
                Ok(percent) => progress.mismatch_percent = Some(percent),
                Err(err) => {
                    tracing::warn!(error = %err, "Not able to compare at this time");
                    println!("Not able to compare at this time: {}", err.message);
                }
            }
        }
        Ok(())
    }

    async fn compare_outputs(
        &self,
        options: &RunOptions,
        run: &RunContext,
        store: &FsArtifactStore,
        session: &mut dyn RenderSession,
        before: Option<Vec<u8>>,
        after: Option<Vec<u8>>,
    ) -> Result<f64, AppError> {
        let (Some(before), Some(after)) = (before, after) else {
            return Err(AppError::new(
                ErrorCategory::ComparisonError,
                format!("render provider '{}' produced no screenshots", self.provider.name()),
            )
            .with_code("AMP-CMP-001"));
        };

        let before_image = compare::decode_png(&before)?;
        let mut after_image = compare::decode_png(&after)?;
        if before_image.height() != after_image.height() {
            let body = run.body_dimensions.ok_or_else(|| {
                AppError::from(ComparisonError::DimensionMismatch {
                    before: before_image.dimensions(),
                    after: after_image.dimensions(),
                })
            })?;
            let page = compare::replacement_page(&after, body);
            store.write(REPLACEMENT_HTML, page.as_bytes())?;
            session.set_content(&page).await?;
            let replacement = session.screenshot(true).await?;
            store.write(REPLACEMENT_PNG, &replacement)?;
            after_image = compare::decode_png(&replacement)?;
        }

        let comparison = compare::compare(&before_image, &after_image, options.compare_options)?;
        store.write(DIFFERENCE_PNG, &compare::encode_png(&comparison.diff)?)?;

        let percent = comparison.percent();
        println!(
            "Difference between original and converted: {:.2}%",
            percent
        );
        let verdict = if comparison.passes(options.pass_ratio) {
            "PASS"
        } else {
            "FAIL"
        };
        println!(
            "Visual comparison: {} (limit {:.2}%)",
            verdict, options.pass_ratio
        );
        Ok(percent)
    }
}
