use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::error::{ServiceError, ValidationError};
use crate::http::{self, RetryPolicy};

pub const UNAVAILABLE_REPORT: &str =
    "Sorry, the symptom analysis could not be generated right now. Please try again later.";

/// Section headings requested from the model, in order.
pub const SECTION_HEADINGS: [&str; 3] = ["Conditions", "Advice", "Diet & Lifestyle"];

#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Generated,
    /// Sentinel text; the service could not produce a report.
    Unavailable,
}

/// Advice text as returned by the inference service.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub text: String,
    pub language: String,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

impl HealthReport {
    fn unavailable(language: &str) -> Self {
        Self {
            text: UNAVAILABLE_REPORT.to_string(),
            language: language.to_string(),
            status: ReportStatus::Unavailable,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.status == ReportStatus::Generated
    }

    /// Best-effort split on the requested headings. Models decorate headings
    /// with markdown (`**Advice:**`, `## Advice`), which is ignored.
    pub fn sections(&self) -> Vec<ReportSection> {
        let mut sections: Vec<ReportSection> = Vec::new();
        for line in self.text.lines() {
            if let Some(heading) = match_heading(line) {
                sections.push(ReportSection {
                    heading: heading.to_string(),
                    body: String::new(),
                });
            } else if let Some(current) = sections.last_mut() {
                if !current.body.is_empty() {
                    current.body.push('\n');
                }
                current.body.push_str(line);
            }
        }
        for section in &mut sections {
            section.body = section.body.trim().to_string();
        }
        sections
    }
}

fn match_heading(line: &str) -> Option<&'static str> {
    let cleaned = line
        .trim()
        .trim_start_matches('#')
        .trim_matches('*')
        .trim()
        .trim_end_matches(':')
        .trim_matches('*')
        .trim();
    SECTION_HEADINGS
        .into_iter()
        .find(|h| h.eq_ignore_ascii_case(cleaned))
}

/// Fixed-shape prompt asking for the three report sections.
pub fn build_prompt(symptoms: &str) -> String {
    format!(
        "Analyze the following symptoms: {}.
Provide possible conditions, advice, and diet recommendations.
Format:
Conditions:
- Condition 1
- Condition 2

Advice:
1. Step 1
2. Step 2

Diet & Lifestyle:
- Recommendation 1
- Recommendation 2
",
        symptoms.trim()
    )
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn completion_text(response: GenerateResponse) -> Result<String, ServiceError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::Empty);
    }
    Ok(text)
}

/// Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        let api_key = config.inference.resolve_api_key().ok_or_else(|| {
            ServiceError::NotConfigured(format!(
                "API key is missing, set {}",
                config.inference.api_key_env
            ))
        })?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.inference.base_url.trim_end_matches('/'),
            config.inference.model
        );
        Ok(Self {
            client: http::build_client(&config.user_agent, config.inference.timeout())?,
            endpoint,
            api_key,
            retry: RetryPolicy::from_config(&config.network),
        })
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = http::send_with_retry(self.retry, "inference", || {
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        completion_text(parsed)
    }
}

/// Builds the prompt and calls the inference service once per report.
#[derive(Clone)]
pub struct ReportGenerator {
    service: Arc<dyn InferenceService>,
}

impl ReportGenerator {
    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        Self { service }
    }

    /// `symptoms` must already be in `language`.
    pub async fn generate(&self, symptoms: &str, language: &str) -> Result<HealthReport, ValidationError> {
        if symptoms.trim().is_empty() {
            return Err(ValidationError::EmptySymptoms);
        }

        let prompt = build_prompt(symptoms);
        debug!(prompt_chars = prompt.len(), "requesting report");

        match self.service.complete(&prompt).await {
            Ok(text) => {
                info!(chars = text.len(), "report generated");
                Ok(HealthReport {
                    text: text.trim().to_string(),
                    language: language.to_string(),
                    status: ReportStatus::Generated,
                })
            }
            Err(e) => {
                error!(error = %e, "report generation failed");
                Ok(HealthReport::unavailable(language))
            }
        }
    }
}
