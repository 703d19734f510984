use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Result, WrapErr, bail};
use log::{debug, info};

mod cli;

use cli::{Cli, OutputFormat};
use ytscribe::analyze::{self, AnalysisRequest, GeminiClient};
use ytscribe::config::{Config, config_path};
use ytscribe::dom::StaticPage;
use ytscribe::fetch::HttpFetch;
use ytscribe::metadata::VideoMetadata;
use ytscribe::orchestrator::Extractor;
use ytscribe::{TranscriptOutcome, output};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytscribe.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytscribe")
        .join("logs")
}

fn build_after_help() -> String {
    let gemini = if std::env::var("GEMINI_API_KEY").is_ok() {
        "  \x1b[32m✅\x1b[0m GEMINI_API_KEY set".to_string()
    } else {
        "  \x1b[33m➖\x1b[0m GEMINI_API_KEY not set (needed for --analyze unless api_keys is configured)".to_string()
    };

    format!(
        "\nANALYSIS:\n{gemini}\n\nConfig is read from: {}\nLogs are written to: {}",
        config_path().display(),
        log_dir().join("ytscribe.log").display()
    )
}

fn parse_format(name: &str) -> Option<OutputFormat> {
    match name.to_ascii_lowercase().as_str() {
        "text" => Some(OutputFormat::Text),
        "json" => Some(OutputFormat::Json),
        _ => None,
    }
}

fn api_keys(config: &Config) -> Vec<String> {
    if !config.api_keys.is_empty() {
        return config.api_keys.clone();
    }
    std::env::var("GEMINI_API_KEY")
        .map(|v| v.split(',').map(|k| k.trim().to_string()).collect())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring invalid config {}: {e}", config_path().display());
        Config::default()
    });

    // CLI flags take priority over the config file
    let mut extract_config = config.extract_config();
    if !cli.langs.is_empty() {
        extract_config.languages = cli.langs.clone();
    }
    extract_config.dom_fallback = !cli.no_dom;

    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(parse_format))
        .unwrap_or(OutputFormat::Text);
    let model = cli
        .model
        .clone()
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| analyze::DEFAULT_MODEL.to_string());

    if cli.verbose {
        let path = config_path();
        if path.exists() {
            eprintln!("Config: {}", path.display());
        }
        debug!("Languages: {:?}", extract_config.languages);
    }

    let client = reqwest::Client::new();
    let fetch: Arc<dyn HttpFetch> = Arc::new(client.clone());

    let mut extractor = Extractor::new(Arc::clone(&fetch), extract_config);
    if let Some(ref path) = cli.page {
        let page = StaticPage::from_file(path).wrap_err_with(|| format!("could not read page {}", path.display()))?;
        extractor = extractor.with_page(Arc::new(page));
    }

    // Collect URLs: from arg or stdin
    let urls = if let Some(ref url) = cli.url {
        vec![url.clone()]
    } else {
        let stdin = io::stdin();
        stdin.lock().lines().collect::<Result<Vec<_>, _>>()?
    };

    if urls.iter().all(|u| u.trim().is_empty()) {
        bail!("no URL or video ID provided\n\nUsage: ytscribe <URL>\n       echo <URL> | ytscribe");
    }

    let gemini = if cli.analyze {
        Some(GeminiClient::new(client.clone(), api_keys(&config), &model)?)
    } else {
        None
    };

    for url_input in &urls {
        let url_input = url_input.trim();
        if url_input.is_empty() {
            continue;
        }

        let video_id = ytscribe::extract_video_id(url_input)
            .ok_or_else(|| eyre::eyre!("could not extract video ID from: {url_input}\n\nSupported formats:\n  https://www.youtube.com/watch?v=ID\n  https://youtu.be/ID\n  https://www.youtube.com/embed/ID\n  https://www.youtube.com/shorts/ID\n  https://www.youtube.com/live/ID\n  <11-character video ID>"))?;

        extractor.cache().navigate_to(&video_id);
        let outcome = extractor.extract(&video_id).await;

        let metadata = if cli.analyze || format == OutputFormat::Json {
            let markup = match extractor.watch_markup_for(&video_id) {
                Some(markup) => markup,
                None => fetch.get_text(&ytscribe::watch_url(&video_id)).await.unwrap_or_default(),
            };
            Some(VideoMetadata::from_markup(&markup))
        } else {
            None
        };

        if cli.verbose {
            report(&outcome, metadata.as_ref());
        }

        let rendered = match format {
            OutputFormat::Text => output::render_text(&outcome),
            OutputFormat::Json => output::render_json(&outcome, metadata.as_ref()),
        };

        if let Some(ref path) = cli.output {
            std::fs::write(path, &rendered)?;
            if cli.verbose {
                eprintln!("Output written to: {}", path.display());
            }
        } else {
            println!("{rendered}");
        }

        if let Some(ref gemini) = gemini {
            let metadata = metadata.unwrap_or_default();
            let prompt = AnalysisRequest::new(&metadata, &outcome).build_prompt(analyze::DEFAULT_PROMPT);
            let analysis = gemini.generate(&prompt).await?;
            println!("\n--- Analysis ---\n{analysis}");
        }
    }

    Ok(())
}

fn report(outcome: &TranscriptOutcome, metadata: Option<&VideoMetadata>) {
    if let Some(meta) = metadata {
        eprintln!("Video: {} ({})", meta.title, outcome.video_id());
    }
    match outcome {
        TranscriptOutcome::Available(t) => {
            let estimated = t.segments.iter().filter(|s| s.estimated).count();
            eprintln!(
                "Method: {}\nLanguage: {}\nSegments: {} ({estimated} with estimated timestamps)",
                t.extraction_method,
                t.language.as_deref().unwrap_or("unknown"),
                t.segments.len(),
            );
        }
        TranscriptOutcome::Unavailable { failures, .. } => {
            eprintln!("No transcript available");
            for failure in failures {
                eprintln!("  {failure}");
            }
        }
    }
}
