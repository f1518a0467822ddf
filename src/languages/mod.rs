/// Language offered for reports and speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub const SUPPORTED: &[Language] = &[
    Language { code: "en", name: "English" },
    Language { code: "es", name: "Spanish" },
    Language { code: "fr", name: "French" },
    Language { code: "hi", name: "Hindi" },
    Language { code: "te", name: "Telugu" },
    Language { code: "ta", name: "Tamil" },
    Language { code: "mr", name: "Marathi" },
    Language { code: "gu", name: "Gujarati" },
    Language { code: "kn", name: "Kannada" },
    Language { code: "ml", name: "Malayalam" },
    Language { code: "or", name: "Odia" },
    Language { code: "bn", name: "Bengali" },
    Language { code: "as", name: "Assamese" },
    Language { code: "pa", name: "Punjabi" },
    Language { code: "ur", name: "Urdu" },
];

/// Look up by code or English name, case-insensitively.
pub fn lookup(code_or_name: &str) -> Option<Language> {
    let wanted = code_or_name.trim();
    SUPPORTED
        .iter()
        .copied()
        .find(|l| l.code.eq_ignore_ascii_case(wanted) || l.name.eq_ignore_ascii_case(wanted))
}

/// clap value parser returning the canonical code.
pub fn parse_language_code(s: &str) -> Result<String, String> {
    lookup(s).map(|l| l.code.to_string()).ok_or_else(|| {
        format!(
            "unsupported language '{}' (run `carecompass languages` for the list)",
            s
        )
    })
}

pub fn same_language(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code_and_name() {
        assert_eq!(lookup("HI").map(|l| l.name), Some("Hindi"));
        assert_eq!(lookup("spanish").map(|l| l.code), Some("es"));
        assert!(lookup("klingon").is_none());
    }

    #[test]
    fn test_parse_language_code() {
        assert_eq!(parse_language_code("French").unwrap(), "fr");
        assert!(parse_language_code("xx").is_err());
    }

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<_> = SUPPORTED.iter().map(|l| l.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), SUPPORTED.len());
    }
}
