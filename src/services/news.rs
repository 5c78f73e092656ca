//! News Generator
//!
//! Asks the generation service for a headline about one instrument and falls
//! back to a fixed table whenever that fails. Composing news never errors.

use crate::error::AppError;
use crate::services::generation::HeadlineSource;
use crate::types::{Instrument, NewsDraft, Sentiment};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// Headlines used when generation is unavailable.
pub const BACKUP_NEWS: &[(&str, Sentiment)] = &[
    ("foreign buyers return on chip recovery hopes", Sentiment::Good),
    ("rate hike fears weigh on sentiment", Sentiment::Bad),
    ("investors wait on the sidelines ahead of tech earnings", Sentiment::Bad),
    ("new AI launch sends related shares soaring", Sentiment::Good),
    ("global supply chain concerns deepen", Sentiment::Bad),
    ("EV sales hit an all-time high", Sentiment::Good),
];

/// Prompt asking for a strict JSON headline about `target`.
pub fn build_prompt(target: &Instrument) -> String {
    format!(
        "Write a breaking stock market news headline.\n\
         Target: {} ({})\n\
         Pick either good news or bad news at random.\n\
         \n\
         Rules:\n\
         1. Respond with valid JSON only.\n\
         2. No explanations or extra text.\n\
         \n\
         Format:\n\
         {{\"headline\": \"headline text, at most 60 characters\", \"type\": \"good\" or \"bad\"}}",
        target.name, target.sector
    )
}

/// First balanced `{...}` substring of `text`, if any.
///
/// Braces inside JSON string literals are ignored.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Strictly parse a generated response into a draft.
pub fn parse_draft(text: &str) -> Result<NewsDraft, AppError> {
    let json = extract_json(text)
        .ok_or_else(|| AppError::ExternalService("no JSON object in response".to_string()))?;

    let draft: NewsDraft = serde_json::from_str(json)
        .map_err(|e| AppError::ExternalService(format!("malformed headline JSON: {}", e)))?;

    if draft.headline.trim().is_empty() {
        return Err(AppError::ExternalService("empty headline".to_string()));
    }

    Ok(NewsDraft {
        headline: draft.headline.trim().to_string(),
        sentiment: draft.sentiment,
    })
}

/// Random backup headline attributed to `target`.
pub fn fallback_draft<R: Rng + ?Sized>(target: &Instrument, rng: &mut R) -> NewsDraft {
    let (headline, sentiment) = BACKUP_NEWS
        .choose(rng)
        .copied()
        .unwrap_or(BACKUP_NEWS[0]);

    NewsDraft {
        headline: format!("{}, {}", target.name, headline),
        sentiment,
    }
}

/// Produces news drafts for the market loop.
#[derive(Clone)]
pub struct NewsGenerator {
    source: Arc<dyn HeadlineSource>,
}

impl NewsGenerator {
    pub fn new(source: Arc<dyn HeadlineSource>) -> Self {
        Self { source }
    }

    /// Generate a draft for `target`, using `fallback` on any failure.
    ///
    /// The fallback is chosen by the caller up front so no random state is
    /// held across the generation call.
    pub async fn compose(&self, target: &Instrument, fallback: NewsDraft) -> NewsDraft {
        let prompt = build_prompt(target);

        let result = match self.source.generate(&prompt).await {
            Ok(text) => parse_draft(&text),
            Err(e) => Err(e),
        };

        match result {
            Ok(draft) => {
                info!("Generated news for {}: {}", target.id, draft.headline);
                draft
            }
            Err(e) => {
                warn!("News generation failed for {} ({}), using backup", target.id, e);
                fallback
            }
        }
    }
}
