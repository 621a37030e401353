use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "broadsheet",
    about = "Extract clean article text from news URLs through the strategy cascade"
)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "broadsheet.yaml")]
    pub config: PathBuf,

    /// File with one article URL per line ("-" reads stdin).
    #[arg(long)]
    pub urls: Option<PathBuf>,

    /// Extract a single URL (repeatable, combines with --urls).
    #[arg(long = "url")]
    pub url: Vec<String>,

    /// Disable authenticated fetches for this run.
    #[arg(long)]
    pub no_auth: bool,

    /// Drop the cached selector for a domain before extracting (repeatable);
    /// use after a known site redesign.
    #[arg(long = "invalidate-domain")]
    pub invalidate_domains: Vec<String>,

    /// Duplicate log events to stderr.
    #[arg(long)]
    pub verbose: bool,
}
