use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct ConvertArgs {
    /// Pages to convert; several URLs run concurrently
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Step file replacing the built-in steps (YAML, or JSON by extension)
    #[arg(long, value_name = "FILE", help_heading = "Steps")]
    pub steps: Option<PathBuf>,

    /// Step file appended after the active steps
    #[arg(long, value_name = "FILE", help_heading = "Steps")]
    pub more_steps: Option<PathBuf>,

    /// Output directory name under the output root (default: URL without scheme)
    #[arg(long, value_name = "NAME", help_heading = "Output Options")]
    pub output: Option<String>,

    /// Skip the development notice in the final document
    #[arg(long, help_heading = "Output Options")]
    pub no_watermark: bool,

    /// Print every validation finding and the full form of action errors
    #[arg(long, help_heading = "Output Options")]
    pub verbose: bool,

    /// Emulated device profile (default: Pixel 2)
    #[arg(long, value_name = "NAME", help_heading = "Rendering")]
    pub device: Option<String>,

    /// Run the browser headless (chromium provider only)
    #[arg(long, value_name = "BOOL", help_heading = "Rendering")]
    pub headless: Option<bool>,

    /// Host used for $HOST and $DOMAIN instead of the page's own
    #[arg(long, value_name = "HOST", help_heading = "Rendering")]
    pub custom_host: Option<String>,

    /// Port of the local preview server (default: 8080)
    #[arg(long, value_name = "PORT", help_heading = "Rendering")]
    pub port: Option<u16>,

    /// Compare screenshots of the original and converted page
    #[arg(long, help_heading = "Comparison")]
    pub compare: bool,

    /// Path to config file (default: ./amplifier.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Screenshot of the original page
    #[arg(value_name = "BEFORE")]
    pub before: PathBuf,

    /// Screenshot of the converted page
    #[arg(value_name = "AFTER")]
    pub after: PathBuf,

    /// Where to write the difference image
    #[arg(long, default_value = "output-difference.png", value_name = "FILE")]
    pub diff: PathBuf,

    /// Per-pixel colour distance tolerated, 0..1 (default: from config, 0.1)
    #[arg(long, value_name = "RATIO")]
    pub threshold: Option<f64>,

    /// Path to config file (default: ./amplifier.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// HTML document to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Path to config file (default: ./amplifier.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Print this step file after validating it instead of the built-in steps
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}
