use thiserror::Error;

/// Failure of an external collaborator (inference, geocoding, place search,
/// translation, speech synthesis).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty response")]
    Empty,

    #[error("service not configured: {0}")]
    NotConfigured(String),
}

impl ServiceError {
    /// Whether a second attempt has a chance of succeeding.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient. Everything
    /// else (4xx, decode errors, empty bodies) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport(err) => {
                if let Some(status) = err.status() {
                    return is_transient_status(status.as_u16());
                }
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            ServiceError::Status(code) => is_transient_status(*code),
            _ => false,
        }
    }
}

fn is_transient_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

/// Missing required input. Recoverable: the user can retry immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please describe your symptoms.")]
    EmptySymptoms,

    #[error("Please enter your location.")]
    EmptyAddress,

    #[error("Please enter both symptoms and location.")]
    EmptySymptomsAndAddress,
}

/// An address that the geocoder could not turn into coordinates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not retrieve coordinates for '{address}'. Please enter a valid location.")]
pub struct ResolutionFailure {
    pub address: String,
}

/// The report could not be laid out or encoded faithfully.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("character {character:?} (U+{code:04X}) on line {line} is not supported by the built-in font; configure document.font_path with a Unicode font")]
    UnsupportedCharacter { character: char, code: u32, line: usize },

    #[error("font error: {0}")]
    Font(String),

    #[error("pdf error: {0}")]
    Pdf(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ServiceError::Status(429).is_transient());
        assert!(ServiceError::Status(503).is_transient());
        assert!(!ServiceError::Status(404).is_transient());
        assert!(!ServiceError::Status(400).is_transient());
    }

    #[test]
    fn test_permanent_variants() {
        assert!(!ServiceError::Empty.is_transient());
        assert!(!ServiceError::Malformed("bad json".into()).is_transient());
        assert!(!ServiceError::NotConfigured("api key".into()).is_transient());
    }

    #[test]
    fn test_resolution_failure_names_address() {
        let err = ResolutionFailure {
            address: "Qwxyznotarealplace123".to_string(),
        };
        assert!(err.to_string().contains("Qwxyznotarealplace123"));
    }
}
