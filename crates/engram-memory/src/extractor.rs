// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity, concept, and topic extraction from memory content.
//!
//! The primary strategy prompts a model provider for structured JSON; a
//! deterministic rule-based fallback (capitalization and keyword
//! statistics) keeps the pipeline alive when no provider is configured or
//! a call fails. Extraction runs on the async post-write path and must
//! never fail a committed write — callers log and move on.

use std::collections::HashMap;
use std::sync::Arc;

use engram_core::traits::ProviderAdapter;
use engram_core::types::{ProviderMessage, ProviderRequest};
use serde::Deserialize;
use tracing::{debug, warn};

/// Prompt for model-based extraction.
const EXTRACTION_PROMPT: &str = r#"Extract the entities, concepts, and topics from the text below.

Return a single JSON object:
- "entities": array of {"name", "type", "mentions", "confidence"} where type is one of: person, organization, technology, location, product, term; mentions is how often it appears; confidence is 0.0-1.0
- "concepts": array of short noun phrases naming the ideas discussed
- "topics": array of 1-3 broad subject labels

Text:
{text}

Output the JSON object only, no explanation:"#;

/// A single extracted entity mention.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default = "default_mentions")]
    pub mentions: i64,
    #[serde(default = "default_entity_confidence")]
    pub confidence: f64,
}

fn default_mentions() -> i64 {
    1
}

fn default_entity_confidence() -> f64 {
    0.5
}

/// Everything extracted from one text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Extracts structured knowledge from raw content.
pub struct EntityExtractor {
    provider: Option<Arc<dyn ProviderAdapter>>,
    model: String,
    max_tokens: u32,
}

impl EntityExtractor {
    pub fn new(
        provider: Option<Arc<dyn ProviderAdapter>>,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model,
            max_tokens,
        }
    }

    /// Extract entities/concepts/topics, degrading to rules when the
    /// model path is unavailable or returns garbage.
    pub async fn extract(&self, text: &str) -> Extraction {
        if let Some(provider) = &self.provider {
            let request = ProviderRequest {
                model: self.model.clone(),
                system_prompt: None,
                messages: vec![ProviderMessage {
                    role: "user".to_string(),
                    content: EXTRACTION_PROMPT.replace("{text}", text),
                }],
                max_tokens: self.max_tokens,
            };
            match provider.complete(request).await {
                Ok(response) => {
                    if let Some(extraction) = parse_extraction_response(&response.content) {
                        return extraction;
                    }
                    warn!("model extraction returned unparseable output, using rules");
                }
                Err(e) => {
                    warn!("model extraction failed, using rules: {e}");
                }
            }
        } else {
            debug!("no provider configured, using rule-based extraction");
        }
        rule_extract(text)
    }
}

/// Parse the model response into an [`Extraction`].
///
/// Handles markdown code fences and surrounding prose; returns `None` on
/// anything that does not contain a parseable JSON object.
pub fn parse_extraction_response(response: &str) -> Option<Extraction> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')? + 1;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..end]).ok()
}

/// Deterministic fallback extraction.
///
/// Entities: consecutive capitalized words (skipping sentence starts that
/// are common words). Concepts: lowercase words of 5+ characters seen at
/// least twice. Topics: the top three concepts.
pub fn rule_extract(text: &str) -> Extraction {
    let mut entity_counts: HashMap<String, i64> = HashMap::new();
    for candidate in capitalized_runs(text) {
        *entity_counts.entry(candidate).or_insert(0) += 1;
    }

    let mut entities: Vec<ExtractedEntity> = entity_counts
        .into_iter()
        .map(|(name, mentions)| ExtractedEntity {
            name,
            entity_type: "term".to_string(),
            mentions,
            confidence: 0.5,
        })
        .collect();
    entities.sort_by(|a, b| b.mentions.cmp(&a.mentions).then(a.name.cmp(&b.name)));
    entities.truncate(10);

    let mut word_counts: HashMap<String, usize> = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 5 && w.chars().all(|c| c.is_lowercase()))
    {
        *word_counts.entry(word.to_string()).or_insert(0) += 1;
    }
    let mut concepts: Vec<(String, usize)> =
        word_counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    concepts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let concepts: Vec<String> = concepts.into_iter().map(|(w, _)| w).take(10).collect();

    let topics = concepts.iter().take(3).cloned().collect();

    Extraction {
        entities,
        concepts,
        topics,
    }
}

/// Runs of capitalized words ("Postgres", "New York") excluding
/// single-letter tokens.
fn capitalized_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in text.split_whitespace() {
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        let is_capitalized = word.len() > 1
            && word.chars().next().is_some_and(|c| c.is_uppercase())
            && word.chars().skip(1).any(|c| c.is_lowercase());
        if is_capitalized {
            current.push(word);
        } else if !current.is_empty() {
            runs.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        runs.push(current.join(" "));
    }
    runs
}
