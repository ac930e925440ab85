//! Identifier normalization
//!
//! External identifiers are the strongest duplicate signal the engine has, so
//! they are validated and canonicalized before they are compared or stored.
//!
//! | Kind         | Canonical grammar                        |
//! |--------------|------------------------------------------|
//! | isbn10       | 9 digits + digit or `X` (checksum)       |
//! | isbn13       | `97[89]` + 10 digits (checksum)          |
//! | asin         | `B0` + 8 alnum, or an ISBN-10 (region)   |
//! | audible-asin | as asin (region)                         |
//! | goodreads    | 1-12 digits                              |
//! | openlibrary  | `OL` + digits + `M`/`W`/`A`              |
//! | handle       | `@` + 1-30 of `[a-z0-9_.]`               |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marketplace regions accepted for ASIN-style identifiers
pub const REGIONS: [&str; 11] = ["us", "uk", "ca", "au", "in", "de", "fr", "it", "es", "jp", "br"];

static ISBN10: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{9}[0-9X]$").unwrap());
static ISBN13: Lazy<Regex> = Lazy::new(|| Regex::new(r"^97[89][0-9]{10}$").unwrap());
static ASIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^B0[0-9A-Z]{8}$").unwrap());
static GOODREADS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{1,12}$").unwrap());
static OPENLIBRARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^OL[0-9]+[MWA]$").unwrap());
static HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@[a-z0-9_.]{1,30}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    Isbn10,
    Isbn13,
    Asin,
    AudibleAsin,
    Goodreads,
    OpenLibrary,
    Handle,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Isbn10 => "isbn10",
            IdentifierKind::Isbn13 => "isbn13",
            IdentifierKind::Asin => "asin",
            IdentifierKind::AudibleAsin => "audible-asin",
            IdentifierKind::Goodreads => "goodreads",
            IdentifierKind::OpenLibrary => "openlibrary",
            IdentifierKind::Handle => "handle",
        }
    }

    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "isbn10" | "isbn-10" => IdentifierKind::Isbn10,
            "isbn13" | "isbn-13" => IdentifierKind::Isbn13,
            "asin" => IdentifierKind::Asin,
            "audible-asin" | "audible_asin" => IdentifierKind::AudibleAsin,
            "goodreads" => IdentifierKind::Goodreads,
            "openlibrary" | "open-library" => IdentifierKind::OpenLibrary,
            "handle" => IdentifierKind::Handle,
            other => return Err(IdentifierError::UnknownKind(other.to_string())),
        })
    }

    /// Marketplace identifiers are only unique within a region
    pub fn requires_region(&self) -> bool {
        matches!(self, IdentifierKind::Asin | IdentifierKind::AudibleAsin)
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an identifier was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("unknown identifier type '{0}'")]
    UnknownKind(String),

    #[error("{kind} '{value}' has an invalid format: {reason}")]
    InvalidFormat {
        kind: IdentifierKind,
        value: String,
        reason: &'static str,
    },

    #[error("{kind} '{value}' failed checksum validation (expected check character '{expected}')")]
    InvalidChecksum {
        kind: IdentifierKind,
        value: String,
        expected: char,
    },

    #[error("{kind} requires a region")]
    MissingRegion { kind: IdentifierKind },

    #[error("unknown region '{region}' for {kind}")]
    UnknownRegion { kind: IdentifierKind, region: String },
}

impl IdentifierError {
    /// Short name of the rule that failed
    pub fn rule(&self) -> &'static str {
        match self {
            IdentifierError::UnknownKind(_) | IdentifierError::InvalidFormat { .. } => {
                "InvalidFormat"
            }
            IdentifierError::InvalidChecksum { .. } => "InvalidChecksum",
            IdentifierError::MissingRegion { .. } => "MissingRegion",
            IdentifierError::UnknownRegion { .. } => "UnknownRegion",
        }
    }
}

/// Identifier as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdentifier {
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl RawIdentifier {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Validated, canonical identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
    /// Lowercased region for marketplace kinds
    pub region: Option<String>,
}

impl Identifier {
    /// Region column value ('' when the kind has no region)
    pub fn region_column(&self) -> &str {
        self.region.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}:{}@{}", self.kind, self.value, region),
            None => write!(f, "{}:{}", self.kind, self.value),
        }
    }
}

/// Validate and canonicalize a submitted identifier
pub fn normalize(raw: &RawIdentifier) -> Result<Identifier, IdentifierError> {
    let kind = IdentifierKind::parse(&raw.kind)?;
    let value = match kind {
        IdentifierKind::Isbn10 => normalize_isbn10(&raw.value)?,
        IdentifierKind::Isbn13 => normalize_isbn13(&raw.value)?,
        IdentifierKind::Asin | IdentifierKind::AudibleAsin => normalize_asin(kind, &raw.value)?,
        IdentifierKind::Goodreads => {
            matching(kind, raw.value.trim().to_string(), &GOODREADS, "expected 1-12 digits")?
        }
        IdentifierKind::OpenLibrary => matching(
            kind,
            raw.value.trim().to_ascii_uppercase(),
            &OPENLIBRARY,
            "expected OL<digits><M|W|A>",
        )?,
        IdentifierKind::Handle => {
            let mut handle = raw.value.trim().to_lowercase();
            if !handle.starts_with('@') {
                handle.insert(0, '@');
            }
            matching(kind, handle, &HANDLE, "expected @ followed by 1-30 of [a-z0-9_.]")?
        }
    };

    let region = normalize_region(kind, raw.region.as_deref())?;

    Ok(Identifier {
        kind,
        value,
        region,
    })
}

/// Normalize a batch, dropping duplicates while keeping first-seen order
pub fn normalize_all(raws: &[RawIdentifier]) -> Result<Vec<Identifier>, IdentifierError> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        let identifier = normalize(raw)?;
        if seen.insert(identifier.clone()) {
            out.push(identifier);
        }
    }
    Ok(out)
}

fn strip_isbn(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn normalize_isbn10(value: &str) -> Result<String, IdentifierError> {
    let kind = IdentifierKind::Isbn10;
    let canonical = matching(
        kind,
        strip_isbn(value),
        &ISBN10,
        "expected 9 digits followed by a digit or X",
    )?;

    let expected = isbn10_check_char(&canonical);
    let actual = canonical.chars().last().unwrap_or_default();
    if actual != expected {
        return Err(IdentifierError::InvalidChecksum {
            kind,
            value: canonical,
            expected,
        });
    }
    Ok(canonical)
}

fn normalize_isbn13(value: &str) -> Result<String, IdentifierError> {
    let kind = IdentifierKind::Isbn13;
    let canonical = matching(
        kind,
        strip_isbn(value),
        &ISBN13,
        "expected 13 digits starting with 978 or 979",
    )?;

    let expected = isbn13_check_char(&canonical);
    let actual = canonical.chars().last().unwrap_or_default();
    if actual != expected {
        return Err(IdentifierError::InvalidChecksum {
            kind,
            value: canonical,
            expected,
        });
    }
    Ok(canonical)
}

fn normalize_asin(kind: IdentifierKind, value: &str) -> Result<String, IdentifierError> {
    let canonical = value.trim().to_ascii_uppercase();
    if ASIN.is_match(&canonical) {
        return Ok(canonical);
    }
    // Book ASINs reuse the ISBN-10
    if ISBN10.is_match(&canonical) {
        return normalize_isbn10(&canonical).map_err(|err| match err {
            IdentifierError::InvalidChecksum {
                value, expected, ..
            } => IdentifierError::InvalidChecksum {
                kind,
                value,
                expected,
            },
            other => other,
        });
    }
    Err(IdentifierError::InvalidFormat {
        kind,
        value: canonical,
        reason: "expected B0 followed by 8 letters/digits, or an ISBN-10",
    })
}

fn normalize_region(
    kind: IdentifierKind,
    region: Option<&str>,
) -> Result<Option<String>, IdentifierError> {
    if !kind.requires_region() {
        return Ok(None);
    }
    let region = region
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty())
        .ok_or(IdentifierError::MissingRegion { kind })?;

    if !REGIONS.contains(&region.as_str()) {
        return Err(IdentifierError::UnknownRegion { kind, region });
    }
    Ok(Some(region))
}

fn matching(
    kind: IdentifierKind,
    value: String,
    grammar: &Regex,
    reason: &'static str,
) -> Result<String, IdentifierError> {
    if grammar.is_match(&value) {
        Ok(value)
    } else {
        Err(IdentifierError::InvalidFormat {
            kind,
            value,
            reason,
        })
    }
}

fn digit(c: char) -> u32 {
    c.to_digit(10).unwrap_or(0)
}

/// Expected ISBN-10 check character for a grammar-valid value
fn isbn10_check_char(canonical: &str) -> char {
    let sum: u32 = canonical
        .chars()
        .take(9)
        .enumerate()
        .map(|(i, c)| (i as u32 + 1) * digit(c))
        .sum();
    match sum % 11 {
        10 => 'X',
        n => char::from_digit(n, 10).unwrap_or('0'),
    }
}

/// Expected ISBN-13 check digit for a grammar-valid value
fn isbn13_check_char(canonical: &str) -> char {
    let sum: u32 = canonical
        .chars()
        .take(12)
        .enumerate()
        .map(|(i, c)| digit(c) * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    char::from_digit((10 - sum % 10) % 10, 10).unwrap_or('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isbn10(value: &str) -> Result<Identifier, IdentifierError> {
        normalize(&RawIdentifier::new("isbn10", value))
    }

    fn isbn13(value: &str) -> Result<Identifier, IdentifierError> {
        normalize(&RawIdentifier::new("isbn13", value))
    }

    #[test]
    fn test_isbn10_valid_checksum() {
        let id = isbn10("0306406152").unwrap();
        assert_eq!(id.kind, IdentifierKind::Isbn10);
        assert_eq!(id.value, "0306406152");
        assert_eq!(id.region, None);
    }

    #[test]
    fn test_isbn10_bad_checksum() {
        let err = isbn10("0306406153").unwrap_err();
        assert_eq!(err.rule(), "InvalidChecksum");
        assert!(matches!(err, IdentifierError::InvalidChecksum { expected: '2', .. }));
    }

    #[test]
    fn test_isbn10_strips_separators_and_uppercases_x() {
        // 080442957X: checksum 10 -> X
        let id = isbn10("0-8044-2957-x").unwrap();
        assert_eq!(id.value, "080442957X");
    }

    #[test]
    fn test_isbn10_bad_format() {
        let err = isbn10("03064061").unwrap_err();
        assert_eq!(err.rule(), "InvalidFormat");
        let err = isbn10("X306406152").unwrap_err();
        assert_eq!(err.rule(), "InvalidFormat");
    }

    #[test]
    fn test_isbn13_valid_checksum() {
        let id = isbn13("978-0-306-40615-7").unwrap();
        assert_eq!(id.value, "9780306406157");
    }

    #[test]
    fn test_isbn13_flipped_last_digit_fails() {
        let err = isbn13("9780306406158").unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidChecksum { expected: '7', .. }));
    }

    #[test]
    fn test_isbn13_requires_978_or_979_prefix() {
        let err = isbn13("9770306406157").unwrap_err();
        assert_eq!(err.rule(), "InvalidFormat");
    }

    #[test]
    fn test_asin_requires_known_region() {
        let missing = normalize(&RawIdentifier::new("asin", "B00TEST123")).unwrap_err();
        assert_eq!(missing.rule(), "MissingRegion");

        let unknown =
            normalize(&RawIdentifier::new("asin", "B00TEST123").with_region("mars")).unwrap_err();
        assert_eq!(unknown.rule(), "UnknownRegion");

        let ok = normalize(&RawIdentifier::new("asin", "b00test123").with_region(" US ")).unwrap();
        assert_eq!(ok.value, "B00TEST123");
        assert_eq!(ok.region.as_deref(), Some("us"));
        assert_eq!(ok.to_string(), "asin:B00TEST123@us");
    }

    #[test]
    fn test_asin_accepts_isbn10_form() {
        let ok = normalize(&RawIdentifier::new("audible-asin", "0306406152").with_region("uk"))
            .unwrap();
        assert_eq!(ok.kind, IdentifierKind::AudibleAsin);

        let bad = normalize(&RawIdentifier::new("asin", "0306406153").with_region("uk"))
            .unwrap_err();
        assert!(matches!(
            bad,
            IdentifierError::InvalidChecksum {
                kind: IdentifierKind::Asin,
                ..
            }
        ));
    }

    #[test]
    fn test_other_grammars() {
        assert!(normalize(&RawIdentifier::new("goodreads", "234225")).is_ok());
        assert!(normalize(&RawIdentifier::new("goodreads", "23a")).is_err());

        let ol = normalize(&RawIdentifier::new("openlibrary", "ol7353617m")).unwrap();
        assert_eq!(ol.value, "OL7353617M");
        assert!(normalize(&RawIdentifier::new("openlibrary", "OL123X")).is_err());

        let handle = normalize(&RawIdentifier::new("handle", "Frank.Herbert")).unwrap();
        assert_eq!(handle.value, "@frank.herbert");
        assert!(normalize(&RawIdentifier::new("handle", "@no spaces")).is_err());
    }

    #[test]
    fn test_unknown_kind() {
        let err = normalize(&RawIdentifier::new("doi", "10.1000/1")).unwrap_err();
        assert!(matches!(err, IdentifierError::UnknownKind(_)));
        assert_eq!(err.rule(), "InvalidFormat");
    }

    #[test]
    fn test_region_ignored_for_regionless_kinds() {
        let id = normalize(&RawIdentifier::new("isbn13", "9780306406157").with_region("us"))
            .unwrap();
        assert_eq!(id.region, None);
        assert_eq!(id.region_column(), "");
    }

    #[test]
    fn test_normalize_all_dedups_canonical_forms() {
        let ids = normalize_all(&[
            RawIdentifier::new("isbn13", "978-0-306-40615-7"),
            RawIdentifier::new("ISBN13", "9780306406157"),
            RawIdentifier::new("isbn10", "0306406152"),
        ])
        .unwrap();
        assert_eq!(ids.len(), 2);
    }
}
