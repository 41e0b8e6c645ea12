//! Model registry: synthesis modes, model identifiers and fallback ordering.
//!
//! The set of models is closed and mirrors the registry shipped inside the
//! Python runner module. Every identifier belongs to exactly one synthesis
//! mode; declaration order below is the fallback preference order.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Generation strategy family supported by the Qwen3-TTS runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Design a voice from a natural-language instruction.
    #[default]
    VoiceDesign,
    /// Use a named preset speaker, optionally steered by an instruction.
    CustomVoice,
    /// Clone a voice from a reference audio sample.
    VoiceClone,
}

impl SynthesisMode {
    /// All modes, in registry declaration order.
    pub const ALL: [SynthesisMode; 3] = [
        SynthesisMode::VoiceDesign,
        SynthesisMode::CustomVoice,
        SynthesisMode::VoiceClone,
    ];

    /// Wire string understood by the runner module.
    pub fn as_str(self) -> &'static str {
        match self {
            SynthesisMode::VoiceDesign => "voice_design",
            SynthesisMode::CustomVoice => "custom_voice",
            SynthesisMode::VoiceClone => "voice_clone",
        }
    }

    /// The canonical default model for this mode.
    pub fn default_model(self) -> ModelIdentifier {
        match self {
            SynthesisMode::VoiceDesign => ModelIdentifier::VoiceDesign17B,
            SynthesisMode::CustomVoice => ModelIdentifier::CustomVoice06B,
            SynthesisMode::VoiceClone => ModelIdentifier::Base06B,
        }
    }
}

impl std::fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynthesisMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voice_design" => Ok(SynthesisMode::VoiceDesign),
            "custom_voice" => Ok(SynthesisMode::CustomVoice),
            "voice_clone" => Ok(SynthesisMode::VoiceClone),
            other => Err(BridgeError::invalid_request(format!(
                "unknown synthesis mode '{other}'"
            ))),
        }
    }
}

/// A concrete Qwen3-TTS checkpoint known to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelIdentifier {
    /// 1.7B VoiceDesign checkpoint (voice-design default).
    #[serde(rename = "Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign")]
    VoiceDesign17B,
    /// 0.6B CustomVoice checkpoint (custom-voice default).
    #[serde(rename = "Qwen/Qwen3-TTS-12Hz-0.6B-CustomVoice")]
    CustomVoice06B,
    /// 1.7B CustomVoice checkpoint.
    #[serde(rename = "Qwen/Qwen3-TTS-12Hz-1.7B-CustomVoice")]
    CustomVoice17B,
    /// 0.6B Base checkpoint used for cloning (voice-clone default).
    #[serde(rename = "Qwen/Qwen3-TTS-12Hz-0.6B-Base")]
    Base06B,
    /// 1.7B Base checkpoint used for cloning.
    #[serde(rename = "Qwen/Qwen3-TTS-12Hz-1.7B-Base")]
    Base17B,
}

impl ModelIdentifier {
    /// All identifiers, in registry declaration order.
    pub const ALL: [ModelIdentifier; 5] = [
        ModelIdentifier::VoiceDesign17B,
        ModelIdentifier::CustomVoice06B,
        ModelIdentifier::CustomVoice17B,
        ModelIdentifier::Base06B,
        ModelIdentifier::Base17B,
    ];

    /// Hub identifier string passed over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelIdentifier::VoiceDesign17B => "Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign",
            ModelIdentifier::CustomVoice06B => "Qwen/Qwen3-TTS-12Hz-0.6B-CustomVoice",
            ModelIdentifier::CustomVoice17B => "Qwen/Qwen3-TTS-12Hz-1.7B-CustomVoice",
            ModelIdentifier::Base06B => "Qwen/Qwen3-TTS-12Hz-0.6B-Base",
            ModelIdentifier::Base17B => "Qwen/Qwen3-TTS-12Hz-1.7B-Base",
        }
    }

    /// The synthesis mode this checkpoint intrinsically belongs to.
    pub fn mode(self) -> SynthesisMode {
        match self {
            ModelIdentifier::VoiceDesign17B => SynthesisMode::VoiceDesign,
            ModelIdentifier::CustomVoice06B | ModelIdentifier::CustomVoice17B => {
                SynthesisMode::CustomVoice
            }
            ModelIdentifier::Base06B | ModelIdentifier::Base17B => SynthesisMode::VoiceClone,
        }
    }
}

impl std::fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelIdentifier {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelIdentifier::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| BridgeError::invalid_request(format!("unknown model id '{wanted}'")))
    }
}

/// A validated `(mode, model)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub mode: SynthesisMode,
    pub model: ModelIdentifier,
}

impl ModelSelection {
    /// Selection for a mode using that mode's canonical default model.
    pub fn for_mode(mode: SynthesisMode) -> Self {
        Self {
            mode,
            model: mode.default_model(),
        }
    }

    /// Checked constructor: the identifier's intrinsic mode must agree.
    pub fn new(mode: SynthesisMode, model: ModelIdentifier) -> BridgeResult<Self> {
        if model.mode() != mode {
            return Err(BridgeError::invalid_request(format!(
                "model '{model}' belongs to mode '{}', not '{mode}'",
                model.mode()
            )));
        }
        Ok(Self { mode, model })
    }
}

impl From<ModelIdentifier> for ModelSelection {
    fn from(model: ModelIdentifier) -> Self {
        Self {
            mode: model.mode(),
            model,
        }
    }
}

impl std::fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mode, self.model)
    }
}

/// Ordered load candidates for a requested selection.
///
/// Strict requests get exactly the requested selection and nothing else.
/// Non-strict requests fall back to same-mode alternatives first (registry
/// order), then to every other mode's models (registry order). Preferring a
/// same-family checkpoint keeps output quality close to what was asked for
/// when the exact request cannot be honored.
pub fn candidates(requested: ModelSelection, strict: bool) -> Vec<ModelSelection> {
    if strict {
        return vec![requested];
    }

    let mut ordered = vec![requested];

    for model in ModelIdentifier::ALL {
        if model.mode() == requested.mode && model != requested.model {
            ordered.push(ModelSelection::from(model));
        }
    }
    for model in ModelIdentifier::ALL {
        if model.mode() != requested.mode {
            ordered.push(ModelSelection::from(model));
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_identifier_has_one_mode() {
        for model in ModelIdentifier::ALL {
            let selection = ModelSelection::from(model);
            assert_eq!(selection.mode, model.mode());
            assert!(ModelSelection::new(model.mode(), model).is_ok());
        }
    }

    #[test]
    fn test_mode_defaults() {
        for mode in SynthesisMode::ALL {
            let selection = ModelSelection::for_mode(mode);
            assert_eq!(selection.mode, mode);
            assert_eq!(selection.model, mode.default_model());
            assert_eq!(selection.model.mode(), mode);
        }
        assert_eq!(
            SynthesisMode::default().default_model(),
            ModelIdentifier::VoiceDesign17B
        );
    }

    #[test]
    fn test_mismatched_selection_rejected() {
        let err = ModelSelection::new(SynthesisMode::VoiceDesign, ModelIdentifier::Base06B);
        assert!(err.is_err());
    }

    #[test]
    fn test_wire_string_round_trip() {
        for mode in SynthesisMode::ALL {
            assert_eq!(mode.as_str().parse::<SynthesisMode>().unwrap(), mode);
        }
        for model in ModelIdentifier::ALL {
            assert_eq!(model.as_str().parse::<ModelIdentifier>().unwrap(), model);
        }
        assert!("Qwen/No-Such-Model".parse::<ModelIdentifier>().is_err());
    }

    #[test]
    fn test_strict_candidates_are_exactly_the_request() {
        let requested = ModelSelection::from(ModelIdentifier::CustomVoice17B);
        assert_eq!(candidates(requested, true), vec![requested]);
    }

    #[test]
    fn test_fallback_order_same_mode_first_then_cross_mode() {
        let requested = ModelSelection::from(ModelIdentifier::CustomVoice17B);
        let order = candidates(requested, false);

        assert_eq!(order[0], requested);

        // Same-mode block directly after the request, in declaration order.
        assert_eq!(order[1].model, ModelIdentifier::CustomVoice06B);

        // Cross-mode block afterwards, in declaration order.
        let cross: Vec<_> = order[2..].iter().map(|s| s.model).collect();
        assert_eq!(
            cross,
            vec![
                ModelIdentifier::VoiceDesign17B,
                ModelIdentifier::Base06B,
                ModelIdentifier::Base17B,
            ]
        );

        // Every identifier appears exactly once.
        let mut models: Vec<_> = order.iter().map(|s| s.model).collect();
        models.sort_by_key(|m| m.as_str());
        models.dedup();
        assert_eq!(models.len(), ModelIdentifier::ALL.len());
    }

    #[test]
    fn test_fallback_candidates_mode_agrees_with_model() {
        for requested in ModelIdentifier::ALL.map(ModelSelection::from) {
            for candidate in candidates(requested, false) {
                assert_eq!(candidate.mode, candidate.model.mode());
            }
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ModelIdentifier::Base06B).unwrap();
        assert_eq!(json, "\"Qwen/Qwen3-TTS-12Hz-0.6B-Base\"");
        let json = serde_json::to_string(&SynthesisMode::VoiceDesign).unwrap();
        assert_eq!(json, "\"voice_design\"");
    }
}
