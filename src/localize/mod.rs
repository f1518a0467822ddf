//! Translation and speech synthesis.
//!
//! Both are best-effort: a failed translation hands back the input text with
//! [`TranslationStatus::Fallback`], a failed synthesis yields no audio.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::http::{self, RetryPolicy};
use crate::languages;

/// Longest text sent in one translation request.
const TRANSLATE_CHUNK_CHARS: usize = 4500;

#[async_trait]
pub trait TranslationService: Send + Sync {
    /// `source == None` asks the service to detect the language.
    async fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// MP3 audio for `text`.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationStatus {
    /// Source and target match; the service was not called.
    Identity,
    Translated,
    /// The service failed and the original text was kept.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedText {
    pub text: String,
    pub language: String,
    pub status: TranslationStatus,
}

impl LocalizedText {
    /// Whether the text really is in `language`.
    pub fn is_translated(&self) -> bool {
        self.status == TranslationStatus::Translated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub language: String,
    pub media_type: &'static str,
}

pub struct Localizer {
    translator: Arc<dyn TranslationService>,
    speech: Option<Arc<dyn SpeechService>>,
}

impl Localizer {
    pub fn new(translator: Arc<dyn TranslationService>) -> Self {
        Self {
            translator,
            speech: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechService>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub async fn localize(&self, text: &str, source: &str, target: &str) -> LocalizedText {
        if languages::same_language(source, target) || text.trim().is_empty() {
            return LocalizedText {
                text: text.to_string(),
                language: target.to_string(),
                status: TranslationStatus::Identity,
            };
        }

        match self.translator.translate(text, None, target).await {
            Ok(translated) => {
                debug!(source, target, chars = translated.chars().count(), "text translated");
                LocalizedText {
                    text: translated,
                    language: target.to_string(),
                    status: TranslationStatus::Translated,
                }
            }
            Err(e) => {
                warn!(source, target, error = %e, "translation failed, keeping original text");
                LocalizedText {
                    text: text.to_string(),
                    language: source.to_string(),
                    status: TranslationStatus::Fallback,
                }
            }
        }
    }

    pub async fn synthesize_speech(&self, text: &str, language: &str) -> Option<AudioClip> {
        let speech = self.speech.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }
        match speech.synthesize(text, language).await {
            Ok(bytes) if !bytes.is_empty() => Some(AudioClip {
                bytes,
                language: language.to_string(),
                media_type: "audio/mpeg",
            }),
            Ok(_) => {
                warn!(language, "speech synthesis returned no audio");
                None
            }
            Err(e) => {
                warn!(language, error = %e, "speech synthesis failed");
                None
            }
        }
    }
}

/// Greedy word packing into pieces of at most `max_chars` characters.
/// Words longer than the limit are split.
pub fn pack_words(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let word_len = word.len();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A piece of text sent to the translator, with the separator that precedes
/// it in the original. Blank lines between chunks live in `separator`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TranslationChunk {
    separator: String,
    text: String,
}

/// Line-preserving split for translation requests. Concatenating every
/// `separator + text` gives back the input (minus trailing blank lines);
/// lines longer than `max_chars` are word-packed and rejoined with spaces.
fn split_for_translation(text: &str, max_chars: usize) -> Vec<TranslationChunk> {
    fn leading(gap: usize, first: bool) -> String {
        "\n".repeat(if first { gap } else { gap + 1 })
    }

    let mut chunks: Vec<TranslationChunk> = Vec::new();
    let mut current: Option<(TranslationChunk, usize)> = None;
    // Blank lines seen since the last non-blank line.
    let mut gap = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            gap += 1;
            continue;
        }
        let line_len = line.chars().count();

        if line_len > max_chars {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            for (i, piece) in pack_words(line, max_chars).into_iter().enumerate() {
                let separator = if i == 0 {
                    leading(gap, chunks.is_empty())
                } else {
                    " ".to_string()
                };
                chunks.push(TranslationChunk { separator, text: piece });
            }
            gap = 0;
            continue;
        }

        let fits = matches!(&current, Some((_, len)) if len + gap + 1 + line_len <= max_chars);
        if let (true, Some((chunk, len))) = (fits, current.as_mut()) {
            chunk.text.push_str(&"\n".repeat(gap + 1));
            chunk.text.push_str(line);
            *len += gap + 1 + line_len;
        } else {
            if let Some((chunk, _)) = current.take() {
                chunks.push(chunk);
            }
            let chunk = TranslationChunk {
                separator: leading(gap, chunks.is_empty()),
                text: line.to_string(),
            };
            current = Some((chunk, line_len));
        }
        gap = 0;
    }
    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }
    chunks
}

/// `[[["translated", "original", ...], ...], null, "detected", ...]`
fn parse_translation(body: &Value) -> Result<String, ServiceError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::Malformed("missing translation segments".to_string()))?;

    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(ServiceError::Empty);
    }
    Ok(text)
}

/// Google Translate `translate_a/single` endpoint (`client=gtx`).
pub struct GoogleTranslateClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GoogleTranslateClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http::build_client(&config.user_agent, config.network.timeout())?,
            base_url: config.translation.base_url.clone(),
            retry: RetryPolicy::from_config(&config.network),
        })
    }

    async fn translate_chunk(&self, chunk: &str, source: &str, target: &str) -> Result<String, ServiceError> {
        let response = http::send_with_retry(self.retry, "translation", || {
            self.client.get(&self.base_url).query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", chunk),
            ])
        })
        .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;
        parse_translation(&body)
    }
}

#[async_trait]
impl TranslationService for GoogleTranslateClient {
    async fn translate(&self, text: &str, source: Option<&str>, target: &str) -> Result<String, ServiceError> {
        let source = source.unwrap_or("auto");
        let mut translated = String::new();
        for chunk in split_for_translation(text, TRANSLATE_CHUNK_CHARS) {
            translated.push_str(&chunk.separator);
            translated.push_str(&self.translate_chunk(&chunk.text, source, target).await?);
        }
        Ok(translated)
    }
}

/// Google Translate text-to-speech endpoint.
pub struct GoogleTtsClient {
    client: Client,
    base_url: String,
    chunk_chars: usize,
    retry: RetryPolicy,
}

impl GoogleTtsClient {
    pub fn new(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http::build_client(&config.user_agent, config.network.timeout())?,
            base_url: config.speech.base_url.clone(),
            chunk_chars: config.speech.chunk_chars,
            retry: RetryPolicy::from_config(&config.network),
        })
    }
}

#[async_trait]
impl SpeechService for GoogleTtsClient {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ServiceError> {
        let chunks = pack_words(text, self.chunk_chars);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        // MP3 frames concatenate cleanly, so chunks are appended as-is.
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = http::send_with_retry(self.retry, "speech", || {
                self.client.get(&self.base_url).query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
            })
            .await?;
            audio.extend_from_slice(&response.bytes().await?);
        }

        if audio.is_empty() {
            return Err(ServiceError::Empty);
        }
        Ok(audio)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prefixes text with the target code, e.g. `[es] fever`.
    #[derive(Default)]
    pub(crate) struct FakeTranslator {
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeTranslator {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationService for FakeTranslator {
        async fn translate(&self, text: &str, _source: Option<&str>, target: &str) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::Status(502));
            }
            Ok(format!("[{}] {}", target, text))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeSpeech {
        pub fail: bool,
    }

    #[async_trait]
    impl SpeechService for FakeSpeech {
        async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, ServiceError> {
            if self.fail {
                return Err(ServiceError::Empty);
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn test_same_language_is_identity_without_service_call() {
        let fake = Arc::new(FakeTranslator::default());
        let localizer = Localizer::new(fake.clone());

        let out = localizer.localize("fever and cough", "en", "EN").await;
        assert_eq!(out.text, "fever and cough");
        assert_eq!(out.status, TranslationStatus::Identity);
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_translation_success() {
        let localizer = Localizer::new(Arc::new(FakeTranslator::default()));
        let out = localizer.localize("fever", "en", "es").await;
        assert_eq!(out.text, "[es] fever");
        assert_eq!(out.language, "es");
        assert!(out.is_translated());
    }

    #[tokio::test]
    async fn test_translation_failure_falls_back_to_original() {
        let localizer = Localizer::new(Arc::new(FakeTranslator {
            fail: true,
            ..FakeTranslator::default()
        }));
        let out = localizer.localize("fever", "en", "hi").await;
        assert_eq!(out.text, "fever");
        assert_eq!(out.language, "en");
        assert_eq!(out.status, TranslationStatus::Fallback);
        assert!(!out.is_translated());
    }

    #[tokio::test]
    async fn test_speech_failure_is_silent() {
        let localizer = Localizer::new(Arc::new(FakeTranslator::default()))
            .with_speech(Arc::new(FakeSpeech { fail: true }));
        assert!(localizer.synthesize_speech("hello", "en").await.is_none());
    }

    #[tokio::test]
    async fn test_speech_without_service_is_none() {
        let localizer = Localizer::new(Arc::new(FakeTranslator::default()));
        assert!(localizer.synthesize_speech("hello", "en").await.is_none());
    }

    #[tokio::test]
    async fn test_speech_clip() {
        let localizer = Localizer::new(Arc::new(FakeTranslator::default()))
            .with_speech(Arc::new(FakeSpeech::default()));
        let clip = localizer.synthesize_speech("hola", "es").await.unwrap();
        assert_eq!(clip.bytes, b"hola");
        assert_eq!(clip.media_type, "audio/mpeg");
    }

    #[test]
    fn test_pack_words_respects_limit() {
        let text = "Drink plenty of fluids and rest. See a doctor if the fever lasts longer than three days.";
        let chunks = pack_words(text, 30);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_pack_words_splits_long_words() {
        let chunks = pack_words("abcdefghij xy", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_split_for_translation_keeps_lines() {
        let text = "Conditions:\n- Flu\n\nAdvice:\n1. Rest";
        let whole = split_for_translation(text, 4500);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].text, text);

        let chunks = split_for_translation(text, 12);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 12));
        assert_eq!(reassemble(&chunks), text);
    }

    fn reassemble(chunks: &[TranslationChunk]) -> String {
        chunks.iter().map(|c| format!("{}{}", c.separator, c.text)).collect()
    }

    #[test]
    fn test_split_keeps_blank_line_on_chunk_boundary() {
        // "Conditions:\n- Flu" fills the first chunk exactly; the blank line
        // falls on the boundary.
        let text = "Conditions:\n- Flu\n\nAdvice:\n- Rest";
        let chunks = split_for_translation(text, 17);
        assert_eq!(chunks[0].text, "Conditions:\n- Flu");
        assert_eq!(chunks[1].separator, "\n\n");
        assert!(chunks[1].text.starts_with("Advice:"));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_split_long_line_pieces_rejoin_with_spaces() {
        let text = "Advice:\n\nrest well and drink water often";
        let chunks = split_for_translation(text, 10);
        assert_eq!(chunks[0].separator, "");
        assert_eq!(chunks[1].separator, "\n\n");
        assert!(chunks[2..].iter().all(|c| c.separator == " "));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_parse_translation_body() {
        let body: Value = serde_json::from_str(
            r#"[[["Fiebre y tos. ","Fever and cough. ",null,null,10],["Descanse.","Rest.",null,null,10]],null,"en"]"#,
        )
        .unwrap();
        assert_eq!(parse_translation(&body).unwrap(), "Fiebre y tos. Descanse.");

        let empty: Value = serde_json::from_str("[[], null, \"en\"]").unwrap();
        assert!(matches!(parse_translation(&empty), Err(ServiceError::Empty)));

        let garbage: Value = serde_json::from_str(r#"{"error": "quota"}"#).unwrap();
        assert!(matches!(parse_translation(&garbage), Err(ServiceError::Malformed(_))));
    }
}
