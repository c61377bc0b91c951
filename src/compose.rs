//! Final prompt construction.
//!
//! A user prompt is used as-is. Without one, the reference image is described and
//! the description rewritten into a prompt. Either way the result carries the
//! face-visibility directives exactly once.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::collaborators::{Describer, Rewriter};
use crate::error::VidgenError;
use crate::types::PromptBundle;

/// Prepended to every prompt.
pub const POSITIVE_DIRECTIVE: &str =
    "Keep the subject's face fully visible and inside the frame for the whole clip.";
/// Appended to prompts that do not already carry a negative marker.
pub const NEGATIVE_DIRECTIVE: &str = "Avoid: no cropped faces, no faces leaving the frame.";
/// Appended to negative prompts that do not already carry a negative marker.
pub const NEGATIVE_KEYWORDS: &str = "no cropped faces, face out of frame, obscured face";

/// Phrases whose presence means the negative directive is already there.
pub const NEGATIVE_MARKERS: [&str; 2] = ["no cropped faces", "不要裁切人脸"];

pub fn has_negative_marker(text: &str) -> bool {
    NEGATIVE_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Adds the positive and negative directives to a prompt. Idempotent.
pub fn augment_prompt(prompt: &str) -> String {
    let prompt = prompt.trim();
    let mut out = if prompt.contains(POSITIVE_DIRECTIVE) {
        prompt.to_string()
    } else if prompt.is_empty() {
        POSITIVE_DIRECTIVE.to_string()
    } else {
        format!("{POSITIVE_DIRECTIVE} {prompt}")
    };
    if !has_negative_marker(&out) {
        out.push(' ');
        out.push_str(NEGATIVE_DIRECTIVE);
    }
    out
}

/// Adds the negative keywords to a negative prompt. Idempotent.
pub fn augment_negative(negative: Option<&str>) -> String {
    let negative = negative.map(str::trim).unwrap_or_default();
    if has_negative_marker(negative) {
        negative.to_string()
    } else if negative.is_empty() {
        NEGATIVE_KEYWORDS.to_string()
    } else {
        format!("{negative}, {NEGATIVE_KEYWORDS}")
    }
}

/// Per-request API keys for the collaborators.
#[derive(Debug, Clone, Default)]
pub struct PromptOverrides {
    pub describer_key: Option<String>,
    pub rewriter_key: Option<String>,
}

pub struct PromptComposer {
    describer: Arc<dyn Describer>,
    rewriter: Arc<dyn Rewriter>,
}

impl PromptComposer {
    pub fn new(describer: Arc<dyn Describer>, rewriter: Arc<dyn Rewriter>) -> Self {
        Self { describer, rewriter }
    }

    /// Builds the final prompt.
    ///
    /// # Errors
    ///
    /// - `VidgenError::Validation` if there is neither a prompt nor an image.
    /// - Whatever the describer returns; there is no prompt to fall back to.
    ///
    /// Rewrite failures are logged and the raw description is used instead.
    pub async fn compose(
        &self,
        user_prompt: &str,
        image_url: Option<&str>,
        overrides: &PromptOverrides,
    ) -> Result<PromptBundle, VidgenError> {
        let user_prompt = user_prompt.trim();
        if !user_prompt.is_empty() {
            return Ok(PromptBundle {
                final_prompt: augment_prompt(user_prompt),
                ..Default::default()
            });
        }

        let Some(image_url) = image_url else {
            return Err(VidgenError::validation("prompt or image required"));
        };

        let description = self
            .describer
            .describe(image_url, overrides.describer_key.as_deref())
            .await?;
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(VidgenError::validation("prompt or image required"));
        }
        debug!(chars = description.len(), "image described");

        let rewritten = match self
            .rewriter
            .rewrite(&description, overrides.rewriter_key.as_deref())
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!("rewrite returned nothing, using raw description");
                None
            }
            Err(e) => {
                warn!(error = %e, "rewrite failed, using raw description");
                None
            }
        };

        let final_prompt = augment_prompt(rewritten.as_deref().unwrap_or(&description));
        Ok(PromptBundle {
            final_prompt,
            description: Some(description),
            rewritten,
        })
    }
}
