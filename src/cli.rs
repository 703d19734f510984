use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "ytscribe",
    about = "YouTube transcript extractor with caption-track and transcript-panel fallback",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// YouTube video URL or video ID (reads from stdin if omitted)
    pub url: Option<String>,

    /// Preferred caption language; repeat in order of preference
    #[arg(short, long = "lang", value_name = "LANG")]
    pub langs: Vec<String>,

    /// Output format: text (default), json
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Saved watch page with the transcript panel expanded, used when caption tracks fail
    #[arg(short, long, value_name = "FILE")]
    pub page: Option<PathBuf>,

    /// Don't fall back to the transcript panel
    #[arg(long)]
    pub no_dom: bool,

    /// Analyze the transcript with Gemini
    #[arg(short, long)]
    pub analyze: bool,

    /// Gemini model for analysis
    #[arg(long)]
    pub model: Option<String>,

    /// Show extraction method and metadata
    #[arg(short, long)]
    pub verbose: bool,
}
