//! Batch translation through Gemini.
//!
//! Fragments are sent twenty at a time as one script with `<break>` between
//! them. The model must hand back the same number of markers; when it does
//! not, the batch is retried once on the fallback model.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{GeminiClient, GeminiError, GenerateRequest, GenerationConfig};
use crate::common::progress::create_counter;
use crate::dub::credentials::CredentialPool;
use crate::dub::retry::{RetryPolicy, Retryable};
use crate::dub::segment::TranscriptSegment;
use crate::ui::prelude::{Level, emit};

pub const BREAK_MARKER: &str = "<break>";
pub const BATCH_SIZE: usize = 20;
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.5-flash-lite";
const TEMPERATURE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation returned {actual} segments for {expected} inputs")]
    MarkerMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Gemini(#[from] GeminiError),
}

impl Retryable for TranslationError {
    fn is_transient(&self) -> bool {
        match self {
            TranslationError::Gemini(err) => err.is_transient(),
            TranslationError::MarkerMismatch { .. } => false,
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `texts` in order; the result has exactly `texts.len()` entries.
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, TranslationError>;
}

/// Translate every segment, returning new records with `translated_text` set.
pub async fn translate_segments(
    translator: &dyn Translator,
    segments: Vec<TranscriptSegment>,
    source_language: &str,
    target_language: &str,
) -> Result<Vec<TranscriptSegment>, TranslationError> {
    let batches = segments.len().div_ceil(BATCH_SIZE);
    let pb = create_counter(batches as u64, format!("Translating to {target_language}"));
    let mut translated = Vec::with_capacity(segments.len());
    let mut remaining = segments.into_iter().peekable();

    while remaining.peek().is_some() {
        let batch: Vec<TranscriptSegment> = remaining.by_ref().take(BATCH_SIZE).collect();
        let texts: Vec<String> = batch.iter().map(|segment| segment.text.clone()).collect();
        let results = translator
            .translate_batch(&texts, source_language, target_language)
            .await?;
        if results.len() != batch.len() {
            return Err(TranslationError::MarkerMismatch {
                expected: batch.len(),
                actual: results.len(),
            });
        }
        translated.extend(
            batch
                .into_iter()
                .zip(results)
                .map(|(segment, text)| segment.with_translation(text)),
        );
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(translated)
}

pub fn join_batch(texts: &[String]) -> String {
    texts
        .iter()
        .map(|text| format!("{text}\n"))
        .collect::<Vec<_>>()
        .join(BREAK_MARKER)
}

pub fn split_batch(script: &str) -> Vec<String> {
    script
        .trim()
        .split(BREAK_MARKER)
        .map(|part| part.trim().to_string())
        .collect()
}

fn translation_prompt(script: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "Strictly, respectfully, and concisely, dub the following script from {source_language} to {target_language}. \
         Keep all the markers \"{BREAK_MARKER}\" intact in their proper place for sync purposes. \
         Return only the translated script.\nScript: \"{script}\""
    )
}

/// Try each model in turn until one preserves the segment count.
async fn translate_with_fallback<'m, F, Fut>(
    models: &[&'m str],
    expected: usize,
    mut call: F,
) -> Result<Vec<String>, TranslationError>
where
    F: FnMut(&'m str) -> Fut,
    Fut: Future<Output = Result<String, TranslationError>>,
{
    let mut actual = 0;
    for &model in models {
        let parts = split_batch(&call(model).await?);
        if parts.len() == expected {
            return Ok(parts);
        }
        actual = parts.len();
        emit(
            Level::Warn,
            "dub.translate.marker_mismatch",
            &format!("{model} returned {actual} segments instead of {expected}"),
            Some(serde_json::json!({
                "model": model,
                "expected": expected,
                "actual": actual,
            })),
        );
    }
    Err(TranslationError::MarkerMismatch { expected, actual })
}

pub struct GeminiTranslator {
    client: GeminiClient,
    credentials: Arc<CredentialPool>,
    model: String,
    fallback_model: String,
    retry: RetryPolicy,
}

impl GeminiTranslator {
    pub fn new(
        client: GeminiClient,
        credentials: Arc<CredentialPool>,
        model: impl Into<String>,
        fallback_model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            credentials,
            model: model.into(),
            fallback_model: fallback_model.into(),
            retry,
        }
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<String, TranslationError> {
        let lease = self.credentials.checkout();
        let request = GenerateRequest::user_prompt(
            prompt,
            GenerationConfig {
                temperature: TEMPERATURE,
                ..GenerationConfig::default()
            },
        );
        let response = self.client.generate(lease.key(), model, &request).await?;
        response
            .text()
            .ok_or(GeminiError::EmptyResponse("text"))
            .map_err(TranslationError::from)
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, TranslationError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = translation_prompt(&join_batch(texts), source_language, target_language);
        let models = [self.model.as_str(), self.fallback_model.as_str()];
        translate_with_fallback(&models, texts.len(), |model| {
            let prompt = prompt.as_str();
            async move {
                self.retry
                    .run("translation", |_| self.complete(model, prompt))
                    .await
            }
        })
        .await
    }
}
