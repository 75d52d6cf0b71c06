//! Query Descriptor
//!
//! Turns raw user input ("Journal of Foo (JFOO) ISSN 1234-5679") into an
//! immutable [`QueryDescriptor`]: normalized name, validated identifiers,
//! aliases and a detected venue category. Built once per assessment and only
//! borrowed afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Kind of venue being assessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueCategory {
    Journal,
    Conference,
    Unknown,
}

/// Identifier kinds recognised in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Print ISSN
    Issn,
    /// Electronic ISSN
    Eissn,
    Doi,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Issn => write!(f, "issn"),
            IdentifierKind::Eissn => write!(f, "eissn"),
            IdentifierKind::Doi => write!(f, "doi"),
        }
    }
}

/// Where an acronym expansion came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcronymExpansion {
    pub acronym: String,
    /// Normalized expanded name
    pub expansion: String,
    /// Provenance (e.g. "acronym-store", "user")
    pub source: String,
}

/// Immutable description of one assessment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub raw_input: String,
    pub normalized_name: String,
    pub identifiers: BTreeMap<IdentifierKind, String>,
    pub aliases: BTreeSet<String>,
    pub venue_category: VenueCategory,
    pub acronym_expansion: Option<AcronymExpansion>,
}

const CONFERENCE_WORDS: &[&str] = &[
    "conference",
    "proceedings",
    "symposium",
    "workshop",
    "congress",
    "colloquium",
];

const JOURNAL_WORDS: &[&str] = &[
    "journal",
    "transactions",
    "letters",
    "review",
    "reviews",
    "annals",
    "bulletin",
    "quarterly",
    "magazine",
    "archives",
];

const IDENTIFIER_LABELS: &[&str] = &["issn", "eissn", "e-issn", "doi", "p-issn"];

impl QueryDescriptor {
    /// Parse raw input into a descriptor
    ///
    /// ISSNs (checksum-validated) and DOIs are lifted out into `identifiers`,
    /// a trailing parenthesised token becomes an alias, and the remainder is
    /// normalized into `normalized_name`.
    pub fn from_input(raw: &str) -> Self {
        let mut identifiers = BTreeMap::new();
        let mut name_tokens: Vec<&str> = Vec::new();

        for token in raw.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
            if token.is_empty() {
                continue;
            }
            let (label, value) = split_label(token);

            if let Some(issn) = parse_issn(value) {
                let kind = if label.as_deref() == Some("eissn")
                    || label.as_deref() == Some("e-issn")
                    || identifiers.contains_key(&IdentifierKind::Issn)
                {
                    IdentifierKind::Eissn
                } else {
                    IdentifierKind::Issn
                };
                identifiers.entry(kind).or_insert(issn);
                continue;
            }

            if let Some(doi) = parse_doi(value) {
                identifiers.entry(IdentifierKind::Doi).or_insert(doi);
                continue;
            }

            if IDENTIFIER_LABELS.contains(&token.trim_end_matches(':').to_lowercase().as_str()) {
                continue;
            }

            name_tokens.push(token);
        }

        let mut name_text = name_tokens.join(" ");
        let mut aliases = BTreeSet::new();

        if let Some((base, inner)) = split_trailing_parenthetical(&name_text) {
            let alias = normalize_name(inner);
            if !alias.is_empty() {
                aliases.insert(alias);
            }
            name_text = base.to_string();
        }

        let normalized_name = normalize_name(&name_text);
        let venue_category = detect_venue_category(&normalized_name);

        debug!(
            normalized_name = %normalized_name,
            identifiers = identifiers.len(),
            aliases = aliases.len(),
            venue_category = ?venue_category,
            "Query normalized"
        );

        Self {
            raw_input: raw.to_string(),
            normalized_name,
            identifiers,
            aliases,
            venue_category,
            acronym_expansion: None,
        }
    }

    /// Add an identifier; ISSNs with a bad check digit are ignored
    pub fn with_identifier(mut self, kind: IdentifierKind, value: &str) -> Self {
        let parsed = match kind {
            IdentifierKind::Issn | IdentifierKind::Eissn => parse_issn(value),
            IdentifierKind::Doi => parse_doi(value),
        };
        match parsed {
            Some(v) => {
                self.identifiers.insert(kind, v);
            }
            None => debug!(kind = %kind, value, "Ignoring invalid identifier"),
        }
        self
    }

    /// Add an alternative name
    pub fn with_alias(mut self, alias: &str) -> Self {
        let alias = normalize_name(alias);
        if !alias.is_empty() && alias != self.normalized_name {
            self.aliases.insert(alias);
        }
        self
    }

    /// Record an acronym expansion and its provenance
    pub fn with_acronym_expansion(
        mut self,
        acronym: &str,
        expansion: &str,
        source: impl Into<String>,
    ) -> Self {
        self.acronym_expansion = Some(AcronymExpansion {
            acronym: acronym.trim().to_string(),
            expansion: normalize_name(expansion),
            source: source.into(),
        });
        self
    }

    /// Attach `expansion` when the raw input is a bare acronym; otherwise a no-op
    pub fn expand_acronym(self, expansion: &str, source: impl Into<String>) -> Self {
        if !self.looks_like_acronym() {
            debug!(input = %self.raw_input, "Input is not an acronym; expansion ignored");
            return self;
        }
        let acronym = self.raw_input.trim().to_string();
        self.with_acronym_expansion(&acronym, expansion, source)
    }

    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        self.identifiers.get(&kind).map(String::as_str)
    }

    /// All ISSNs (print then electronic)
    pub fn issns(&self) -> impl Iterator<Item = &str> {
        [IdentifierKind::Issn, IdentifierKind::Eissn]
            .into_iter()
            .filter_map(move |k| self.identifier(k))
    }

    /// Whether the raw input is a bare acronym such as "IJACSA"
    pub fn looks_like_acronym(&self) -> bool {
        let trimmed = self.raw_input.trim();
        let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
        letters >= 2
            && trimmed.len() <= 12
            && !trimmed.contains(char::is_whitespace)
            && trimmed
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    }
}

/// Normalize a venue name for comparison
///
/// Lowercases, spells out `&`, turns punctuation into spaces, collapses
/// whitespace and drops a leading "the".
pub fn normalize_name(name: &str) -> String {
    let mapped: String = name
        .replace('&', " and ")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();

    let mut words: Vec<&str> = mapped.split_whitespace().collect();
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    words.join(" ")
}

/// Parse and validate an ISSN, returning the canonical `NNNN-NNNC` form
pub fn parse_issn(value: &str) -> Option<String> {
    if !value.is_ascii() {
        return None;
    }
    let compact: String = value.chars().filter(|c| *c != '-').collect();
    let hyphens = value.chars().filter(|c| *c == '-').count();
    if compact.len() != 8 || hyphens > 1 || (hyphens == 1 && value.find('-') != Some(4)) {
        return None;
    }

    let chars: Vec<char> = compact.to_ascii_uppercase().chars().collect();
    if !chars[..7].iter().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let sum: u32 = chars[..7]
        .iter()
        .enumerate()
        .map(|(i, c)| c.to_digit(10).unwrap_or(0) * (8 - i as u32))
        .sum();
    let check = (11 - sum % 11) % 11;
    let expected = if check == 10 {
        'X'
    } else {
        char::from_digit(check, 10)?
    };
    if chars[7] != expected {
        return None;
    }

    let digits: String = chars.iter().collect();
    Some(format!("{}-{}", &digits[..4], &digits[4..]))
}

/// Parse a DOI (bare, `doi:` or resolver URL form), lowercased
pub fn parse_doi(value: &str) -> Option<String> {
    let lower = value.trim().trim_end_matches('.').to_lowercase();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);

    match bare.split_once('/') {
        Some((prefix, suffix))
            if prefix.starts_with("10.")
                && prefix.len() > 3
                && prefix[3..].chars().all(|c| c.is_ascii_digit() || c == '.')
                && !suffix.is_empty() =>
        {
            Some(bare.to_string())
        }
        _ => None,
    }
}

/// Split "ISSN:1234-5679" into (`Some("issn")`, "1234-5679")
fn split_label(token: &str) -> (Option<String>, &str) {
    let token = token.trim_matches(|c: char| "()[]{}\"'".contains(c));
    if token.to_lowercase().starts_with("http") {
        return (None, token);
    }
    match token.split_once(':') {
        Some((label, value)) if !value.is_empty() => (Some(label.to_lowercase()), value),
        _ => (None, token),
    }
}

/// "Journal of Foo (JFOO)" → ("Journal of Foo", "JFOO")
fn split_trailing_parenthetical(text: &str) -> Option<(&str, &str)> {
    let trimmed = text.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    let open = trimmed.rfind('(')?;
    let inner = trimmed[open + 1..trimmed.len() - 1].trim();
    let base = trimmed[..open].trim_end();
    if inner.is_empty() || base.is_empty() {
        return None;
    }
    Some((base, inner))
}

fn detect_venue_category(normalized_name: &str) -> VenueCategory {
    let words: Vec<&str> = normalized_name.split_whitespace().collect();
    if words.iter().any(|w| CONFERENCE_WORDS.contains(w)) {
        VenueCategory::Conference
    } else if words.iter().any(|w| JOURNAL_WORDS.contains(w)) {
        VenueCategory::Journal
    } else {
        VenueCategory::Unknown
    }
}

// ============================================================================
// Tests
// ============================================================================
