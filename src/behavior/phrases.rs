//! Bulk reply phrase files
//!
//! A phrase file maps intent tokens to one or more replies. JSON, YAML and
//! TOML are accepted, chosen by extension. Tokens containing dots must be
//! quoted in TOML:
//!
//! ```toml
//! Greeting = ["Hello friend!", "Hey there!"]
//! "Greeting.HowAreYou" = "Hi, I'm doing great!"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Parsed phrase file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseFile {
    replies: BTreeMap<String, Vec<String>>,
}

/// Phrase file syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl PhraseFormat {
    /// Detect the format from a file extension
    ///
    /// # Errors
    ///
    /// Returns error for unknown or missing extensions
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(Error::Config(format!(
                "unsupported phrase file type: {}",
                path.display()
            ))),
        }
    }
}

impl PhraseFile {
    /// Read and parse a phrase file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let format = PhraseFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let file = Self::parse(&content, format)?;
        tracing::debug!(
            path = %path.display(),
            tokens = file.token_count(),
            phrases = file.phrase_count(),
            "loaded phrase file"
        );
        Ok(file)
    }

    /// Parse phrase file content
    ///
    /// Empty phrases are dropped; tokens left with no phrases are dropped too.
    ///
    /// # Errors
    ///
    /// Returns error if the content is malformed or a token is blank
    pub fn parse(content: &str, format: PhraseFormat) -> Result<Self> {
        let raw: BTreeMap<String, OneOrMany> = match format {
            PhraseFormat::Json => serde_json::from_str(content)?,
            PhraseFormat::Yaml => serde_yaml::from_str(content)?,
            PhraseFormat::Toml => toml::from_str(content)?,
        };

        let mut replies = BTreeMap::new();
        for (token, phrases) in raw {
            let token = token.trim().to_string();
            if token.is_empty() {
                return Err(Error::Config("phrase file contains a blank token".to_string()));
            }

            let phrases: Vec<String> = Vec::from(phrases)
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if phrases.is_empty() {
                tracing::warn!(%token, "no phrases for token, skipping");
                continue;
            }
            replies.insert(token, phrases);
        }

        Ok(Self { replies })
    }

    /// Token to phrases, sorted by token
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.replies.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of tokens
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.replies.len()
    }

    /// Number of phrases across all tokens
    #[must_use]
    pub fn phrase_count(&self) -> usize {
        self.replies.values().map(Vec::len).sum()
    }
}
