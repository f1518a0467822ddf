mod config;
mod document;
mod error;
mod geocode;
mod http;
mod languages;
mod localize;
mod map;
mod places;
mod playback;
mod report;
mod session;
mod ui;
mod voice;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ConfigLoader};
use crate::document::DocumentRenderer;
use crate::geocode::{CoordinateResolver, NominatimClient};
use crate::localize::{GoogleTranslateClient, GoogleTtsClient, Localizer};
use crate::places::{FacilityCategory, OverpassClient, PlaceFinder};
use crate::report::{GeminiClient, ReportGenerator};
use crate::session::{RouteOutcome, Session, SessionOutcome, SessionRequest};
use crate::voice::{CommandRecognizer, SpeechRecognizer, TextSource};

const MAP_FILE: &str = "healthcare_map.html";

#[derive(Parser)]
#[command(author, version, about = "Symptom analysis with localized reports and nearby healthcare facilities")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra configuration file, merged over ./carecompass.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze symptoms and map nearby facilities
    Analyze(AnalyzeArgs),
    /// Draw the straight route between two places with its distance
    Route {
        /// Start location (city, village, or address)
        #[arg(long)]
        from: String,
        /// End location (city, village, or address)
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "route_map.html")]
        out: PathBuf,
    },
    /// List supported report languages
    Languages,
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// Symptom description; prompts interactively when omitted
    #[arg(long)]
    symptoms: Option<String>,

    /// Your location; prompts interactively when omitted
    #[arg(long)]
    address: Option<String>,

    /// Search radius in km, clamped to 1-20
    #[arg(long)]
    radius_km: Option<f64>,

    /// Report language code or name
    #[arg(long, default_value = "en", value_parser = languages::parse_language_code)]
    language: String,

    /// Facility category to search (repeatable); defaults to the configured set
    #[arg(long = "category")]
    categories: Vec<FacilityCategory>,

    /// Directory for the PDF report and the map
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Read the translated report aloud
    #[arg(long)]
    speak: bool,

    /// Save synthesized speech here instead of playing it
    #[arg(long)]
    audio_out: Option<PathBuf>,

    /// Capture symptoms with the configured speech recognizer
    #[arg(long)]
    voice: bool,
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_resolver(config: &AppConfig) -> Result<CoordinateResolver> {
    Ok(CoordinateResolver::new(Arc::new(NominatimClient::new(config)?)))
}

fn build_session(config: &AppConfig, categories: Vec<FacilityCategory>) -> Result<Session> {
    let inference = GeminiClient::new(config).context("inference service is not set up")?;
    let localizer = Localizer::new(Arc::new(GoogleTranslateClient::new(config)?))
        .with_speech(Arc::new(GoogleTtsClient::new(config)?));
    let renderer = DocumentRenderer::new(&config.document)?;

    Ok(Session::new(
        build_resolver(config)?,
        ReportGenerator::new(Arc::new(inference)),
        localizer,
        renderer,
        PlaceFinder::new(Arc::new(OverpassClient::new(config)?)),
    )
    .with_categories(categories)
    .with_pivot_language(config.translation.pivot_language.clone()))
}

async fn read_symptoms(args: &AnalyzeArgs, recognizer: Option<&dyn SpeechRecognizer>) -> Result<TextSource> {
    if let Some(symptoms) = &args.symptoms {
        return Ok(TextSource::Typed(symptoms.clone()));
    }
    if args.voice {
        match recognizer {
            Some(recognizer) => {
                ui::display_voice_prompt();
                match voice::capture(recognizer).await {
                    Ok(source) => {
                        ui::display_recognized(source.text());
                        return Ok(source);
                    }
                    Err(e) => ui::display_warning(&format!("{}; please type your symptoms instead.", e)),
                }
            }
            None => ui::display_warning(
                "Voice input is not configured (set [voice] command); please type your symptoms instead.",
            ),
        }
    }
    Ok(TextSource::Typed(ui::prompt_symptoms()?))
}

async fn deliver(result: &session::SessionReport, args: &AnalyzeArgs, config: &AppConfig) -> Result<()> {
    ui::display_report(result);

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;

    match &result.document {
        Ok(document) => {
            let path = args.out_dir.join(document.file_name);
            tokio::fs::write(&path, &document.bytes)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            ui::display_saved("Report", &path);
        }
        Err(e) => ui::display_error(&format!("The PDF report could not be created: {}", e)),
    }

    let map_path = args.out_dir.join(MAP_FILE);
    write_map(&result.map, &map_path, "Nearby Healthcare Facilities").await?;

    if let Some(clip) = &result.speech {
        let outcome = match &args.audio_out {
            Some(path) => playback::save(clip, path).await,
            None => playback::play(clip, &config.speech.player).await,
        };
        if let Err(e) = outcome {
            warn!(error = %e, "speech output failed");
            ui::display_warning(&format!("Could not play the spoken report: {}", e));
        }
    } else if args.speak {
        ui::display_warning("Spoken report is unavailable right now.");
    }
    Ok(())
}

async fn write_map(map: &map::MapDocument, path: &Path, title: &str) -> Result<()> {
    tokio::fs::write(path, map.to_html(title))
        .await
        .with_context(|| format!("cannot write {}", path.display()))?;
    ui::display_saved("Map", path);
    Ok(())
}

async fn analyze(args: AnalyzeArgs, config: &AppConfig) -> Result<()> {
    let categories = if args.categories.is_empty() {
        config.places.categories.clone()
    } else {
        args.categories.clone()
    };
    let session = build_session(config, categories)?;
    let recognizer = CommandRecognizer::from_command(&config.voice.command);
    let interactive = args.symptoms.is_none() || args.address.is_none();

    if interactive {
        ui::display_welcome();
    }

    loop {
        let symptoms = read_symptoms(&args, recognizer.as_ref().map(|r| r as &dyn SpeechRecognizer)).await?;
        if interactive && args.symptoms.is_none() && symptoms.text().trim().eq_ignore_ascii_case("q") {
            ui::display_goodbye();
            break;
        }
        let address = match &args.address {
            Some(address) => address.clone(),
            None => ui::prompt_address()?,
        };

        let request = SessionRequest {
            symptoms,
            address,
            radius_km: args.radius_km.unwrap_or(config.places.default_radius_km),
            language: args.language.clone(),
            speak: args.speak || args.audio_out.is_some(),
        };

        let outcome = {
            let spinner = ui::SpinnerObserver::new();
            session.run(&request, &spinner).await
        };

        match outcome {
            SessionOutcome::Warning(e) => ui::display_warning(&e.to_string()),
            SessionOutcome::Failed(e) => ui::display_error(&e.to_string()),
            SessionOutcome::Done(result) => deliver(&result, &args, config).await?,
        }

        if !interactive || !ui::ask_search_again()? {
            if interactive {
                ui::display_goodbye();
            }
            break;
        }
    }

    Ok(())
}

async fn route(from: &str, to: &str, out: &Path, config: &AppConfig) -> Result<()> {
    let resolver = build_resolver(config)?;
    match session::plan_route(&resolver, from, to).await {
        RouteOutcome::Done(map) => {
            write_map(&map, out, &format!("Route: {} to {}", from, to)).await?;
            ui::display_route(&map, from, to);
            Ok(())
        }
        RouteOutcome::Warning(e) => bail!("{}", e),
        RouteOutcome::Failed(e) => bail!("Unable to generate map due to missing location data. {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ConfigLoader::load(cli.config.as_deref()).context("invalid configuration")?;
    info!(user_agent = %config.user_agent, "configuration loaded");

    match cli.command {
        Command::Analyze(args) => analyze(args, &config).await,
        Command::Route { from, to, out } => route(&from, &to, &out, &config).await,
        Command::Languages => {
            ui::display_languages(languages::SUPPORTED);
            Ok(())
        }
    }
}
