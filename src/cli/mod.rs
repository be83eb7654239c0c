pub mod args;
pub mod commands;

pub use args::{CompareArgs, ConvertArgs, StepsArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::Path;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "amplifier")]
#[command(version = crate::VERSION)]
#[command(about = "Convert HTML pages into validated AMP documents")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: convert a page, inspect output/<name>/steps, tune a step file, convert again with --steps."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Convert pages through the step pipeline",
        long_about = "Convert loads each URL, runs the conversion steps while validating after every action, and writes per-step snapshots, logs and the final document under the output directory.",
        after_help = "Example:\n    amplifier convert https://example.com/article --compare --verbose"
    )]
    Convert(ConvertArgs),
    #[command(
        about = "Measure the pixel difference between two screenshots",
        long_about = "Compare reports the percentage of mismatched pixels between two PNG screenshots of equal size and writes a difference image.",
        after_help = "Example:\n    amplifier compare before.png after.png --diff diff.png"
    )]
    Compare(CompareArgs),
    #[command(
        about = "Validate an HTML document",
        long_about = "Validate runs the configured validator against a local file and prints its findings.",
        after_help = "Example:\n    amplifier validate output/example.com/output-final.html"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Print conversion steps",
        long_about = "Steps prints the built-in step list as YAML, or checks and prints a custom step file.",
        after_help = "Example:\n    amplifier steps > my-steps.yaml"
    )]
    Steps(StepsArgs),
}

impl Command {
    /// Config file named on the command line, if any.
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Command::Convert(args) => args.config.as_deref(),
            Command::Compare(args) => args.config.as_deref(),
            Command::Validate(args) => args.config.as_deref(),
            Command::Steps(_) => None,
        }
    }

    pub fn verbose(&self) -> bool {
        matches!(self, Command::Convert(args) if args.verbose)
    }
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Convert(convert_args) => commands::convert(convert_args).await,
        Command::Compare(compare_args) => commands::compare(compare_args),
        Command::Validate(validate_args) => commands::validate(validate_args).await,
        Command::Steps(steps_args) => commands::steps(steps_args),
    }
}
