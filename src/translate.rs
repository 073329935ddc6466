use crate::config::TranslatorConfig;
use crate::constants::SOURCE_LANGUAGE;
use crate::error::{Result, SyncError};
use crate::types::{CanonicalEvent, EventFields};
use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// External text-generation collaborator. Must return the translated fields
/// in the same structured shape or fail the call.
#[async_trait]
pub trait TranslateApi: Send + Sync {
    async fn translate_fields(
        &self,
        fields: &EventFields,
        target_language: &str,
    ) -> Result<EventFields>;
}

/// Chat-completions backed translator. The response is constrained to a
/// JSON object so the output parses straight back into [`EventFields`].
pub struct OpenAiTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTranslator {
    /// Build the translator from `OPENAI_API_KEY`. Returns `None` when the
    /// key is absent, which callers treat as passthrough mode for the whole
    /// batch rather than a failure.
    pub fn from_env(config: &TranslatorConfig) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "ko" => "Korean",
        "en" => "English",
        "ja" => "Japanese",
        "zh" => "Simplified Chinese",
        other => other,
    }
}

const TRANSLATE_INSTRUCTION: &str = "You translate cultural event listings. \
Keep proper nouns, prices, and dates exactly as written in the source. \
Keep the same number of long_description paragraphs and the same number of tips. \
Respond with only a JSON object of the shape \
{\"title\": string, \"description\": string, \"long_description\": [string], \"tips\": [string]}.";

#[async_trait]
impl TranslateApi for OpenAiTranslator {
    #[instrument(skip(self, fields))]
    async fn translate_fields(
        &self,
        fields: &EventFields,
        target_language: &str,
    ) -> Result<EventFields> {
        let user_prompt = format!(
            "Translate the following event fields into {}.\n\n{}",
            language_name(target_language),
            serde_json::to_string_pretty(fields)?
        );
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": TRANSLATE_INSTRUCTION},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Api {
                message: format!("translation request failed with status {}", status.as_u16()),
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SyncError::MissingField("choices[0].message.content".into()))?;

        // Unparsable structured output counts as a failed translation
        let translated: EventFields = serde_json::from_str(content)?;
        if translated.long_description.len() != fields.long_description.len() {
            return Err(SyncError::Api {
                message: format!(
                    "translation dropped paragraphs: expected {}, got {}",
                    fields.long_description.len(),
                    translated.long_description.len()
                ),
            });
        }
        debug!("Translated fields into {}", target_language);
        Ok(translated)
    }
}

/// Produce one [`EventFields`] bundle for every requested language.
///
/// The source language short-circuits to the original text. A failed
/// translation for any language degrades to the original text for that
/// language. A missing translator (no credentials) degrades every language
/// the same way. Callers can rely on the map containing every requested
/// code.
pub async fn localize_event(
    translator: Option<&dyn TranslateApi>,
    event: &CanonicalEvent,
    languages: &[String],
) -> HashMap<String, EventFields> {
    let source_fields = EventFields::of(event);
    let mut localized = HashMap::new();

    for language in languages {
        if language == SOURCE_LANGUAGE {
            localized.insert(language.clone(), source_fields.clone());
            continue;
        }

        let fields = match translator {
            Some(api) => match api.translate_fields(&source_fields, language).await {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(
                        "Translation to {} failed for '{}', keeping source text: {}",
                        language, event.title, e
                    );
                    counter!("cs_translate_failures_total", "language" => language.clone())
                        .increment(1);
                    source_fields.clone()
                }
            },
            None => source_fields.clone(),
        };
        localized.insert(language.clone(), fields);
    }

    localized
}
