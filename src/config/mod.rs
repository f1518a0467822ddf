//! Layered application configuration.
//!
//! Built once in `main` and passed to every component. Nothing reads
//! credentials or endpoints from process-wide state after that point.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::places::FacilityCategory;

const APP_DIR: &str = "carecompass";
const PROJECT_FILE: &str = "carecompass.toml";
const ENV_PREFIX: &str = "CARECOMPASS_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sent with every request; Nominatim rejects anonymous clients.
    pub user_agent: String,
    pub network: NetworkConfig,
    pub inference: InferenceConfig,
    pub geocoding: GeocodingConfig,
    pub places: PlacesConfig,
    pub translation: TranslationConfig,
    pub speech: SpeechConfig,
    pub voice: VoiceConfig,
    pub document: DocumentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("carecompass/", env!("CARGO_PKG_VERSION")).to_string(),
            network: NetworkConfig::default(),
            inference: InferenceConfig::default(),
            geocoding: GeocodingConfig::default(),
            places: PlacesConfig::default(),
            translation: TranslationConfig::default(),
            speech: SpeechConfig::default(),
            voice: VoiceConfig::default(),
            document: DocumentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    /// Extra attempts after the first one, transient failures only.
    pub retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Inline key, only for local testing.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl InferenceConfig {
    /// Inline key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacesConfig {
    pub base_url: String,
    pub categories: Vec<FacilityCategory>,
    pub default_radius_km: f64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://overpass-api.de/api/interpreter".to_string(),
            categories: vec![FacilityCategory::Hospital, FacilityCategory::Pharmacy],
            default_radius_km: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub base_url: String,
    /// Language the inference prompt is written in.
    pub pivot_language: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.googleapis.com/translate_a/single".to_string(),
            pivot_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub chunk_chars: usize,
    /// Player command; the audio file path is appended as the last argument.
    pub player: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com/translate_tts".to_string(),
            chunk_chars: 100,
            player: vec!["mpg123".to_string(), "-q".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Recognizer command printing the transcript on stdout. Empty disables
    /// voice input.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub title: String,
    /// TrueType font used instead of built-in Helvetica, required for
    /// non-Latin scripts.
    pub font_path: Option<PathBuf>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            title: "Healthcare Report".to_string(),
            font_path: None,
        }
    }
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. `CARECOMPASS_*` environment variables (`__` separates sections)
    /// 2. Explicit config path (if provided)
    /// 3. Project file `./carecompass.toml`
    /// 4. Global file `$XDG_CONFIG_HOME/carecompass/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<AppConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(&global_path));
            }
        }

        let project = PathBuf::from(PROJECT_FILE);
        if project.exists() {
            figment = figment.merge(Toml::file(&project));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().map_err(Box::new)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }
}
