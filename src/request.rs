//! Synthesis request type and its mode invariants.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::models::{ModelIdentifier, ModelSelection, SynthesisMode};

/// Language passed to the runner when the request does not specify one.
pub const DEFAULT_LANGUAGE: &str = "English";
/// Preset speaker used when a custom-voice request does not name one.
pub const DEFAULT_SPEAKER: &str = "ryan";
/// Sample rate of the runner's WAV output.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// A single synthesis request.
///
/// The `voice` field carries the mode's primary style parameter: the
/// voice-design instruction in design mode, the preset speaker name in
/// custom-voice mode. It is ignored by clone mode, which styles itself
/// entirely from `reference_audio`.
///
/// # Examples
///
/// ```
/// use qwen_tts_bridge::{SynthesisMode, SynthesisRequestBuilder};
///
/// let request = SynthesisRequestBuilder::default()
///     .text("Hello, world!")
///     .mode(SynthesisMode::CustomVoice)
///     .voice("serena")
///     .build()?;
/// assert_eq!(request.selection().mode, SynthesisMode::CustomVoice);
/// # Ok::<(), qwen_tts_bridge::SynthesisRequestBuilderError>(())
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::check"))]
pub struct SynthesisRequest {
    /// Text to synthesize. Must not be blank.
    pub text: String,
    /// Generation strategy.
    #[builder(default)]
    pub mode: SynthesisMode,
    /// Explicit model; `None` uses the mode's canonical default.
    #[builder(default)]
    pub model: Option<ModelIdentifier>,
    /// Language hint forwarded to the runner.
    #[builder(default = "DEFAULT_LANGUAGE.to_string()")]
    pub language: String,
    /// Primary voice/style parameter (instruction or speaker name).
    #[builder(default = "DEFAULT_SPEAKER.to_string()")]
    pub voice: String,
    /// Secondary instruction; meaningful only for custom-voice mode.
    #[builder(default)]
    pub instruct: Option<String>,
    /// Reference audio sample; required by clone mode and rejected elsewhere.
    #[builder(default)]
    pub reference_audio: Option<Vec<u8>>,
    /// Target sample rate for the returned WAV.
    #[builder(default = "DEFAULT_SAMPLE_RATE")]
    pub sample_rate: u32,
}

impl SynthesisRequest {
    /// The effective `(mode, model)` selection for this request.
    pub fn selection(&self) -> ModelSelection {
        match self.model {
            Some(model) => ModelSelection {
                mode: self.mode,
                model,
            },
            None => ModelSelection::for_mode(self.mode),
        }
    }

    /// Check the mode invariants. The builder runs this automatically;
    /// callers constructing requests field-by-field should call it too.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.text.trim().is_empty() {
            return Err(BridgeError::invalid_request("text must not be blank"));
        }
        if let Some(model) = self.model {
            ModelSelection::new(self.mode, model)?;
        }
        match self.mode {
            SynthesisMode::VoiceClone => {
                if self.reference_audio.as_ref().map_or(true, |a| a.is_empty()) {
                    return Err(BridgeError::invalid_request(
                        "voice_clone requires non-empty reference_audio",
                    ));
                }
            }
            _ => {
                if self.reference_audio.is_some() {
                    return Err(BridgeError::invalid_request(
                        "reference_audio is only valid for voice_clone",
                    ));
                }
            }
        }
        if self.instruct.is_some() && self.mode != SynthesisMode::CustomVoice {
            return Err(BridgeError::invalid_request(
                "instruct is only valid for custom_voice",
            ));
        }
        Ok(())
    }
}

impl SynthesisRequestBuilder {
    fn check(&self) -> Result<(), String> {
        // Build a throwaway copy so the shared validator can run. Defaults
        // mirror the field attributes above.
        let request = SynthesisRequest {
            text: self.text.clone().unwrap_or_default(),
            mode: self.mode.unwrap_or_default(),
            model: self.model.clone().unwrap_or_default(),
            language: self
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            voice: self
                .voice
                .clone()
                .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
            instruct: self.instruct.clone().unwrap_or_default(),
            reference_audio: self.reference_audio.clone().unwrap_or_default(),
            sample_rate: self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
        };
        request.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = SynthesisRequestBuilder::default()
            .text("Hello")
            .build()
            .unwrap();

        assert_eq!(request.mode, SynthesisMode::VoiceDesign);
        assert_eq!(request.language, "English");
        assert_eq!(request.sample_rate, 24_000);
        assert_eq!(
            request.selection(),
            ModelSelection::for_mode(SynthesisMode::VoiceDesign)
        );
    }

    #[test]
    fn test_blank_text_rejected() {
        let err = SynthesisRequestBuilder::default().text("   ").build();
        assert!(err.is_err());
    }

    #[test]
    fn test_clone_mode_requires_reference_audio() {
        let err = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::VoiceClone)
            .build();
        assert!(err.is_err());

        let request = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::VoiceClone)
            .reference_audio(Some(vec![0u8; 64]))
            .build()
            .unwrap();
        assert_eq!(request.selection().model, ModelIdentifier::Base06B);
    }

    #[test]
    fn test_reference_audio_rejected_outside_clone_mode() {
        let err = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::CustomVoice)
            .reference_audio(Some(vec![0u8; 64]))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_model_must_match_mode() {
        let err = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::VoiceDesign)
            .model(Some(ModelIdentifier::CustomVoice06B))
            .build();
        assert!(err.is_err());

        let request = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::CustomVoice)
            .model(Some(ModelIdentifier::CustomVoice17B))
            .build()
            .unwrap();
        assert_eq!(request.selection().model, ModelIdentifier::CustomVoice17B);
    }

    #[test]
    fn test_instruct_only_for_custom_voice() {
        let err = SynthesisRequestBuilder::default()
            .text("Hello")
            .instruct(Some("whisper".to_string()))
            .build();
        assert!(err.is_err());

        let request = SynthesisRequestBuilder::default()
            .text("Hello")
            .mode(SynthesisMode::CustomVoice)
            .voice("serena")
            .instruct(Some("whisper".to_string()))
            .build()
            .unwrap();
        assert_eq!(request.voice, "serena");
    }
}
