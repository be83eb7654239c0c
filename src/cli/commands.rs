use crate::{
    cli::args::{CompareArgs, ConvertArgs, StepsArgs, ValidateArgs},
    cli::Args as CliArgs,
    core::{
        config::{RenderConfig, RenderProviderKind, ValidatorConfig, ValidatorKind},
        pipeline::{
            actions::CustomActionRegistry,
            compare::{self, CompareOptions},
            render::{device_names, device_profile, RenderProvider, StaticRenderProvider},
            runner::print_validation,
            schema::{default_steps, default_steps_source, load_steps, Step},
            validation::{CachingValidator, CommandValidator, NullValidator, Validator},
            Orchestrator, RunOptions,
        },
        AmplifierConfig, ConfigLoader, ConfigValidator, RunStatus,
    },
    Result,
};
use anyhow::{anyhow, Context};
use clap::CommandFactory;
use futures::future::join_all;
use std::fs;

/// Convert every URL concurrently on the current thread.
pub async fn convert(args: ConvertArgs) -> Result<()> {
    if args.urls.is_empty() {
        print_convert_usage()?;
        return Ok(());
    }

    let mut config = ConfigLoader::load(args.config.as_deref())?;
    apply_convert_overrides(&mut config, &args);
    ConfigValidator::validate(&config)?;

    let steps = resolve_steps(&args)?;
    tracing::info!(
        steps = steps.len(),
        urls = args.urls.len(),
        provider = ?config.render.provider,
        "starting conversion"
    );

    let provider = build_provider(&config.render)?;
    let validator = build_validator(&config.validator);
    let custom = CustomActionRegistry::with_builtins();
    let orchestrator = Orchestrator::new(provider.as_ref(), validator.as_ref(), &custom);

    let runs: Vec<RunOptions> = args
        .urls
        .iter()
        .enumerate()
        .map(|(index, url)| run_options(&config, &args, index, url))
        .collect::<Result<_>>()?;

    let orchestrator = &orchestrator;
    let steps = &steps;
    let outcomes = join_all(
        runs.iter()
            .map(|options| async move { orchestrator.run(steps, options).await }),
    )
    .await;

    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.status == RunStatus::CompleteWithErrors)
        .count();
    if failed > 0 {
        return Err(anyhow!(
            "{} of {} conversions completed with errors",
            failed,
            outcomes.len()
        ));
    }
    Ok(())
}

/// Compare two screenshots and write the difference image.
pub fn compare(args: CompareArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let threshold = args.threshold.unwrap_or(config.compare.threshold);
    let options = CompareOptions {
        threshold,
        ..CompareOptions::default()
    };

    let before = fs::read(&args.before)
        .with_context(|| format!("failed to read {}", args.before.display()))?;
    let after = fs::read(&args.after)
        .with_context(|| format!("failed to read {}", args.after.display()))?;

    let comparison = compare::compare_png(&before, &after, options)?;
    let diff = compare::encode_png(&comparison.diff)?;
    fs::write(&args.diff, diff)
        .with_context(|| format!("failed to write {}", args.diff.display()))?;

    println!(
        "Difference between original and converted: {:.2}%",
        comparison.percent()
    );
    let verdict = if comparison.passes(config.compare.pass_ratio) {
        "PASS"
    } else {
        "FAIL"
    };
    println!(
        "Visual comparison: {} (limit {:.2}%)",
        verdict, config.compare.pass_ratio
    );
    println!("Difference image: {}", args.diff.display());
    Ok(())
}

/// Validate a local document with the configured validator.
pub async fn validate(args: ValidateArgs) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let html = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let validator = build_validator(&config.validator);
    let diagnostics = validator.validate(&html).await?;
    println!("{}:", args.file.display());
    print_validation(&diagnostics, true);
    Ok(())
}

/// Print the built-in steps, or a checked custom step file, as YAML.
pub fn steps(args: StepsArgs) -> Result<()> {
    match args.file {
        None => print!("{}", default_steps_source()),
        Some(path) => {
            let steps = load_steps(&path)?;
            let yaml = serde_yaml::to_string(&steps).context("failed to render steps")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

fn print_convert_usage() -> Result<()> {
    let mut command = CliArgs::command();
    if let Some(convert) = command.find_subcommand_mut("convert") {
        convert.print_help()?;
    } else {
        command.print_help()?;
    }
    Ok(())
}

/// CLI flags win over file and environment values.
fn apply_convert_overrides(config: &mut AmplifierConfig, args: &ConvertArgs) {
    if let Some(device) = &args.device {
        config.render.device = device.clone();
    }
    if let Some(headless) = args.headless {
        config.render.headless = headless;
    }
    if let Some(port) = args.port {
        config.render.preview_port = port;
    }
    if args.compare {
        config.compare.enabled = true;
    }
    if args.no_watermark {
        config.output.watermark = false;
    }
}

fn resolve_steps(args: &ConvertArgs) -> Result<Vec<Step>> {
    let mut steps = match &args.steps {
        Some(path) => load_steps(path)?,
        None => default_steps()?,
    };
    if let Some(path) = &args.more_steps {
        steps.extend(load_steps(path)?);
    }
    Ok(steps)
}

fn run_options(
    config: &AmplifierConfig,
    args: &ConvertArgs,
    index: usize,
    url: &str,
) -> Result<RunOptions> {
    let device = device_profile(&config.render.device).ok_or_else(|| {
        anyhow!(
            "unknown device '{}'; supported devices are {}",
            config.render.device,
            device_names().join(", ")
        )
    })?;

    let many = args.urls.len() > 1;
    let output_name = args.output.as_ref().map(|name| {
        if many {
            format!("{}-{}", name, index + 1)
        } else {
            name.clone()
        }
    });
    // Port 0 asks the OS for a free port, so it is shared as is.
    let preview_port = match config.render.preview_port {
        0 => 0,
        port => port.saturating_add(index as u16),
    };

    let mut options = RunOptions::new(url);
    options.output_root = config.output.root.clone();
    options.output_name = output_name;
    options.device = device;
    options.custom_host = args.custom_host.clone();
    options.verbose = args.verbose;
    options.watermark = config.output.watermark;
    options.preview_port = Some(preview_port);
    options.compare = config.compare.enabled;
    options.compare_options = CompareOptions {
        threshold: config.compare.threshold,
        ..CompareOptions::default()
    };
    options.pass_ratio = config.compare.pass_ratio;
    Ok(options)
}

fn build_provider(config: &RenderConfig) -> Result<Box<dyn RenderProvider>> {
    match config.provider {
        RenderProviderKind::Static => Ok(Box::new(StaticRenderProvider::new())),
        #[cfg(feature = "chromium")]
        RenderProviderKind::Chromium => Ok(Box::new(
            crate::core::pipeline::render::ChromiumRenderProvider::new(config.headless),
        )),
        #[cfg(not(feature = "chromium"))]
        RenderProviderKind::Chromium => Err(anyhow!(
            "render.provider 'chromium' requires building with --features chromium"
        )),
    }
}

fn build_validator(config: &ValidatorConfig) -> Box<dyn Validator> {
    match config.kind {
        ValidatorKind::Command => Box::new(CachingValidator::new(CommandValidator::new(
            config.command.clone(),
            config.args.clone(),
        ))),
        ValidatorKind::None => Box::new(NullValidator),
    }
}
