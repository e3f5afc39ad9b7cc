//! Line, station and region identifier normalization.
//!
//! The three sources spell the same place differently ("Gare de Lyon",
//! "GARE-DE-LYON ", "gare_de_lyon"). Every identifier goes through
//! [`normalize_identifier`] and then an optional alias table so that joins
//! and category vocabularies see one spelling.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{IngestError, Result};

fn separator_runs() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("separator regex is valid"))
}

/// Uppercase, collapse separator runs to `_`, strip edges. `None` when nothing is left.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let collapsed = separator_runs().replace_all(&upper, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Alias table mapping normalized spellings to a canonical identifier.
///
/// Stored in the model artifact so inference normalizes exactly like training.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierVocabulary {
    aliases: BTreeMap<String, String>,
}

impl IdentifierVocabulary {
    /// Vocabulary with no aliases (normalization only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(alias, canonical)` pairs. Both sides are normalized;
    /// pairs that normalize to nothing are skipped.
    pub fn with_aliases<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let aliases = pairs
            .into_iter()
            .filter_map(|(alias, canonical)| {
                Some((
                    normalize_identifier(alias.as_ref())?,
                    normalize_identifier(canonical.as_ref())?,
                ))
            })
            .collect();
        Self { aliases }
    }

    /// Load a JSON object of `{ "alias": "CANONICAL" }` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let pairs: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| IngestError::InvalidAliases(format!("{}: {e}", path.display())))?;
        Ok(Self::with_aliases(pairs))
    }

    /// Canonical form of `raw`, or `None` if it is blank.
    pub fn canonical(&self, raw: &str) -> Option<String> {
        let normalized = normalize_identifier(raw)?;
        match self.aliases.get(&normalized) {
            Some(canonical) => Some(canonical.clone()),
            None => Some(normalized),
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
