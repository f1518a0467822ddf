use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::languages::{self, Language};
use crate::map::MapDocument;
use crate::session::{SessionReport, Stage, StageObserver};

const RULE: &str = "═══════════════════════════════════════════════════════════════";

/// Display welcome message
pub fn display_welcome() {
    println!();
    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║                         CareCompass                           ║");
    println!("║        Symptom Analysis & Nearby Healthcare Facilities        ║");
    println!("╠═══════════════════════════════════════════════════════════════╣");
    println!("║  Describe your symptoms and location to receive possible      ║");
    println!("║  conditions, advice and a map of nearby hospitals and         ║");
    println!("║  pharmacies.                                                  ║");
    println!("║                                                               ║");
    println!("║          WARNING: This is NOT a diagnosis tool.               ║");
    println!("║     Always consult a medical professional for proper          ║");
    println!("║     diagnosis and treatment.                                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
}

fn read_line() -> io::Result<String> {
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Get user input for their symptoms
pub fn prompt_symptoms() -> io::Result<String> {
    println!("\n{RULE}");
    println!("              DESCRIBE YOUR SYMPTOMS OR CONCERNS");
    println!("{RULE}");
    println!("Enter what you're feeling or experiencing (q to quit):\n");
    read_line()
}

pub fn prompt_address() -> io::Result<String> {
    print!("Enter your location: ");
    read_line()
}

pub fn display_voice_prompt() {
    println!("Speak now...");
}

pub fn display_recognized(text: &str) {
    println!("You said: {}", text);
}

/// Ask user if they want to search again
pub fn ask_search_again() -> io::Result<bool> {
    println!("\nWould you like to analyze other symptoms? (y/n)");
    let input = read_line()?.to_lowercase();
    Ok(input == "y" || input == "yes")
}

pub fn display_goodbye() {
    println!("\nGoodbye! Take care!");
}

pub fn display_warning(message: &str) {
    println!("\n⚠  {}", message);
}

pub fn display_error(message: &str) {
    eprintln!("\n✖  {}", message);
}

/// Spinner that follows session stages.
pub struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("Processing...");
        Self { bar }
    }
}

impl Default for SpinnerObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StageObserver for SpinnerObserver {
    fn on_stage(&self, stage: Stage) {
        match stage {
            Stage::Done | Stage::Failed | Stage::Idle => self.bar.finish_and_clear(),
            _ => self.bar.set_message(stage.to_string()),
        }
    }
}

impl Drop for SpinnerObserver {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Display the analysis, facilities and where the artifacts went
pub fn display_report(result: &SessionReport) {
    let language = languages::lookup(&result.localized.language)
        .map(|l| l.name)
        .unwrap_or("original language");

    println!("\n{RULE}");
    println!("                      SYMPTOM ANALYSIS");
    println!("{RULE}\n");
    if !result.report.is_generated() {
        println!("(The analysis service is unavailable; showing a placeholder.)\n");
    } else if result.localized.is_translated() {
        println!("(Translated to {})\n", language);
    }
    let sections = result.report.sections();
    if result.report.is_generated() && !result.localized.is_translated() && !sections.is_empty() {
        for section in sections {
            println!("┌─ {}", section.heading);
            for line in section.body.lines() {
                println!("│ {}", line);
            }
            println!("└{}\n", "─".repeat(40));
        }
    } else {
        println!("{}", result.localized.text);
    }

    println!("\n{RULE}");
    println!("                NEARBY HEALTHCARE FACILITIES");
    println!("{RULE}\n");
    println!(
        "Your location: {}   Search radius: {:.0} km",
        result.location,
        result.radius.km()
    );
    if result.facilities.is_empty() {
        println!("No facilities found nearby.");
    } else {
        println!(
            "{} facilities and {} location marker on the map",
            result.map.facility_markers(),
            result.map.user_markers()
        );
    }
    for (i, facility) in result.facilities.iter().enumerate() {
        println!("│ #{}. {}  {}", i + 1, facility.label(), facility.location);
    }

    println!("\n{RULE}");
    println!("    This is NOT a diagnosis. Consult a medical professional.");
    println!("{RULE}\n");
}

pub fn display_saved(what: &str, path: &Path) {
    println!("{} saved to {}", what, path.display());
}

pub fn display_route(map: &MapDocument, from: &str, to: &str) {
    if let Some(route) = &map.route {
        println!(
            "The distance between '{}' and '{}' is approximately {}.",
            from,
            to,
            route.label()
        );
    }
}

pub fn display_languages(supported: &[Language]) {
    println!("Supported languages:");
    for language in supported {
        println!("  {:<4} {}", language.code, language.name);
    }
}
