//! Intent classification (LUIS-compatible)

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::IntentConfig;
use crate::{Error, Result};

/// Entity type tag for resolved numbers
pub const NUMBER_ENTITY: &str = "builtin.number";

/// A typed value extracted from an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Type tag, e.g. `builtin.number`
    pub entity_type: String,
    /// Matched text
    pub text: String,
    /// Resolved value, when the classifier provides one
    pub value: Option<String>,
}

impl Entity {
    /// Create an entity
    #[must_use]
    pub fn new(entity_type: impl Into<String>, text: impl Into<String>, value: Option<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            value,
        }
    }

    /// Numeric value of a `builtin.number` entity
    #[must_use]
    pub fn number(&self) -> Option<f64> {
        if self.entity_type != NUMBER_ENTITY {
            return None;
        }
        self.value
            .as_deref()
            .unwrap_or(&self.text)
            .trim()
            .parse()
            .ok()
    }
}

/// Classifier result
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// Dotted intent name, e.g. `Weather.GetCondition`
    pub token: String,
    /// Confidence in `[0, 1]`
    pub score: f64,
    /// Extracted entities in utterance order
    pub entities: Vec<Entity>,
}

impl Intent {
    /// Create an intent with no entities
    #[must_use]
    pub fn new(token: impl Into<String>, score: f64) -> Self {
        Self {
            token: token.into(),
            score,
            entities: Vec::new(),
        }
    }

    /// Attach an entity
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }
}

/// Maps recognized text to an intent
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify one utterance
    async fn classify(&self, text: &str) -> Result<Intent>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LuisResponse {
    top_scoring_intent: LuisIntent,
    #[serde(default)]
    entities: Vec<LuisEntity>,
}

#[derive(Deserialize)]
struct LuisIntent {
    intent: String,
    #[serde(default)]
    score: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LuisEntity {
    entity: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    start_index: usize,
    #[serde(default)]
    resolution: Option<LuisResolution>,
}

#[derive(Deserialize)]
struct LuisResolution {
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl From<LuisResponse> for Intent {
    fn from(response: LuisResponse) -> Self {
        let mut entities = response.entities;
        entities.sort_by_key(|e| e.start_index);

        Self {
            token: response.top_scoring_intent.intent,
            score: response.top_scoring_intent.score,
            entities: entities
                .into_iter()
                .map(|e| {
                    let value = e.resolution.and_then(|r| r.value).map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    });
                    Entity::new(e.entity_type, e.entity, value)
                })
                .collect(),
        }
    }
}

/// Parse a classifier response body
///
/// # Errors
///
/// Returns error if the body is not a valid prediction
pub fn parse_prediction(body: &str) -> Result<Intent> {
    let response: LuisResponse = serde_json::from_str(body)
        .map_err(|e| Error::Classification(format!("malformed prediction: {e}")))?;
    Ok(response.into())
}

/// LUIS prediction client
pub struct LuisClassifier {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for LuisClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuisClassifier")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl LuisClassifier {
    /// Create a classifier from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the app ID or key is missing
    pub fn new(config: &IntentConfig, timeout: Duration) -> Result<Self> {
        let app_id = config
            .app_id
            .as_deref()
            .ok_or_else(|| Error::Config("intent app ID required".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("intent API key required".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            url: format!("{}/{app_id}", config.endpoint.trim_end_matches('/')),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl IntentClassifier for LuisClassifier {
    async fn classify(&self, text: &str) -> Result<Intent> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("subscription-key", self.api_key.expose_secret()),
                ("q", text),
                ("verbose", "true"),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Classification(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "intent classification failed");
            return Err(Error::Classification(format!("classifier returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Classification(format!("read failed: {e}")))?;
        let intent = parse_prediction(&body)?;
        tracing::debug!(
            text,
            intent = %intent.token,
            score = intent.score,
            entities = intent.entities.len(),
            "classified utterance"
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prediction_with_entities() {
        let body = r#"{
            "query": "drive for 3 seconds",
            "topScoringIntent": {"intent": "Drive", "score": 0.97},
            "intents": [{"intent": "Drive", "score": 0.97}],
            "entities": [
                {"entity": "seconds", "type": "Unit", "startIndex": 12, "endIndex": 18, "score": 0.8},
                {"entity": "3", "type": "builtin.number", "startIndex": 10, "endIndex": 10,
                 "resolution": {"value": "3"}}
            ]
        }"#;

        let intent = parse_prediction(body).unwrap();
        assert_eq!(intent.token, "Drive");
        assert!((intent.score - 0.97).abs() < f64::EPSILON);
        assert_eq!(intent.entities.len(), 2);
        assert_eq!(intent.entities[0].entity_type, NUMBER_ENTITY);
        assert_eq!(intent.entities[0].number(), Some(3.0));
        assert_eq!(intent.entities[1].number(), None);
    }

    #[test]
    fn numeric_resolution_values_are_accepted() {
        let body = r#"{"topScoringIntent":{"intent":"Drive","score":0.5},
            "entities":[{"entity":"ten","type":"builtin.number","resolution":{"value":10}}]}"#;
        let intent = parse_prediction(body).unwrap();
        assert_eq!(intent.entities[0].number(), Some(10.0));
    }

    #[test]
    fn missing_entities_default_to_empty() {
        let intent = parse_prediction(r#"{"topScoringIntent":{"intent":"None","score":0.1}}"#).unwrap();
        assert_eq!(intent, Intent::new("None", 0.1));
    }

    #[test]
    fn malformed_prediction_is_classification_error() {
        assert!(matches!(
            parse_prediction(r#"{"intents":[]}"#),
            Err(Error::Classification(_))
        ));
    }

    #[test]
    fn classifier_requires_credentials() {
        let config = IntentConfig {
            app_id: Some("app".to_string()),
            api_key: None,
            endpoint: "https://example.com/apps/".to_string(),
        };
        assert!(LuisClassifier::new(&config, Duration::from_secs(1)).is_err());

        let config = IntentConfig {
            api_key: Some(SecretString::from("key")),
            ..config
        };
        let classifier = LuisClassifier::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(classifier.url, "https://example.com/apps/app");
    }
}
