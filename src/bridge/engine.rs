//! The bridge state machine serializing all interpreter traffic.
//!
//! [`QwenBridge`] wraps the interpreter runtime in a single mutex so that at
//! most one interpreter call is in flight at any instant, regardless of how
//! many service threads hold the bridge. This is a correctness requirement
//! of the embedded interpreter, not a tuning choice: it is only safe to
//! drive from one native caller at a time under GIL discipline.
//!
//! Informal state machine:
//!
//! ```text
//! Uninitialized → Initialized(no module) → ModuleLoaded(no model) → Ready
//! ```
//!
//! `import_module` failure stays at Initialized; `load_model` failure stays
//! at ModuleLoaded; `unload_model` returns Ready → ModuleLoaded; `shutdown`
//! returns to Uninitialized from any state.

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{BridgeOptions, RuntimeConfiguration};
use crate::error::{BridgeError, BridgeResult};
use crate::models::{candidates, ModelSelection, SynthesisMode};
use crate::request::SynthesisRequest;
use crate::SynthesisResult;

use super::interpreter::PyRuntime;
use super::marshal::PyArg;

/// Snapshot of the bridge's externally observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatus {
    /// Interpreter is initialized.
    pub initialized: bool,
    /// Runner module imported successfully.
    pub module_loaded: bool,
    /// A model is currently loaded.
    pub model_loaded: bool,
    /// Selection actually loaded (may differ from requested after fallback).
    pub active_selection: Option<ModelSelection>,
    /// Selection named by the most recent load request.
    pub requested_selection: Option<ModelSelection>,
    /// Whether the most recent load request was strict.
    pub strict_load: bool,
    /// True when the active selection differs from the requested one.
    pub fallback_applied: bool,
    /// Derived readiness: initialized ∧ module_loaded ∧ model_loaded.
    pub ready: bool,
    /// Most recent operation failure, cleared on success.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct BridgeInner {
    runtime: Option<PyRuntime>,
    module_name: String,
    module_loaded: bool,
    model_loaded: bool,
    active: Option<ModelSelection>,
    requested: Option<ModelSelection>,
    strict_load: bool,
    fallback_applied: bool,
    last_error: Option<String>,
}

/// Serialized-access bridge over the embedded Qwen3-TTS runner.
///
/// All operations lock the same internal state, so callers from concurrent
/// request-handling threads queue in submission order. Operations that may
/// run a long time (model loads, synthesis) block the queue; the service
/// layer is expected to wrap calls with its own deadline and abandon late
/// results rather than interrupt the interpreter.
pub struct QwenBridge {
    inner: Mutex<BridgeInner>,
    options: BridgeOptions,
}

impl QwenBridge {
    /// Create an uninitialized bridge with the given options.
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            inner: Mutex::new(BridgeInner::default()),
            options,
        }
    }

    /// Create an uninitialized bridge with default options.
    pub fn with_defaults() -> Self {
        Self::new(BridgeOptions::default())
    }

    /// The options this bridge was built with.
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Load the interpreter library, resolve its API and initialize it.
    ///
    /// Fails with [`BridgeError::AlreadyInitialized`] on a second call;
    /// construction-level failures (missing library or symbol) are fatal
    /// and non-retryable, while an initialization failure leaves the bridge
    /// uninitialized for a possible retry.
    pub fn initialize(&self, config: &RuntimeConfiguration) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        if inner.runtime.is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }

        match PyRuntime::start(config) {
            Ok(runtime) => {
                *inner = BridgeInner {
                    runtime: Some(runtime),
                    module_name: config.module_name.clone(),
                    ..BridgeInner::default()
                };
                Ok(())
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Import the runner module. Requires a prior `initialize`; importing
    /// resets any previous model-load state.
    pub fn import_module(&self) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        let result = match inner.runtime.as_ref() {
            Some(runtime) => runtime.import(&inner.module_name),
            None => return Err(BridgeError::NotInitialized),
        };

        match result {
            Ok(()) => {
                log::info!("runner module '{}' imported", inner.module_name);
                inner.module_loaded = true;
                inner.model_loaded = false;
                inner.active = None;
                inner.fallback_applied = false;
                inner.last_error = None;
                Ok(())
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Load a model, walking the fallback candidate list unless `strict`.
    ///
    /// Returns `Ok(true)` when some candidate loaded, `Ok(false)` when the
    /// whole list was exhausted (the final candidate's failure is kept in
    /// status). The requested selection and strict flag are recorded before
    /// the first attempt, whatever the outcome.
    pub fn load_model(&self, selection: ModelSelection, strict: bool) -> BridgeResult<bool> {
        let mut inner = self.inner.lock();
        inner.require_module()?;
        inner.load_model_locked(selection, strict)
    }

    /// Synthesize speech for a validated request.
    ///
    /// If the request's effective selection is not the active one (or no
    /// model is loaded), a non-strict load runs first; its failure surfaces
    /// as [`BridgeError::ModelNotLoaded`].
    pub fn synthesize(&self, request: &SynthesisRequest) -> BridgeResult<SynthesisResult> {
        request.validate()?;

        let mut inner = self.inner.lock();
        inner.require_module()?;

        let selection = request.selection();
        if !inner.model_loaded || inner.active != Some(selection) {
            if !inner.load_model_locked(selection, false)? {
                let reason = inner
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "implicit model load failed".to_string());
                return Err(BridgeError::ModelNotLoaded(reason));
            }
        }

        let result = {
            let runtime = match inner.runtime.as_ref() {
                Some(runtime) => runtime,
                None => return Err(BridgeError::NotInitialized),
            };
            // Pass the model actually loaded, so the runner's own
            // ensure-loaded step agrees with the native selection even
            // after a fallback.
            let model_id = inner.active.unwrap_or(selection).model.as_str();
            let sample_rate = i64::from(request.sample_rate);

            match request.mode {
                SynthesisMode::VoiceDesign => runtime.call_bytes(
                    &inner.module_name,
                    "synthesize_voice_design",
                    &[
                        PyArg::Str(&request.text),
                        PyArg::Str(&request.voice),
                        PyArg::Str(&request.language),
                        PyArg::Int(sample_rate),
                        PyArg::Str(model_id),
                    ],
                ),
                SynthesisMode::CustomVoice => runtime.call_bytes(
                    &inner.module_name,
                    "synthesize_custom_voice",
                    &[
                        PyArg::Str(&request.text),
                        PyArg::Str(&request.voice),
                        PyArg::Str(request.instruct.as_deref().unwrap_or("")),
                        PyArg::Str(&request.language),
                        PyArg::Int(sample_rate),
                        PyArg::Str(model_id),
                    ],
                ),
                SynthesisMode::VoiceClone => runtime.call_bytes(
                    &inner.module_name,
                    "synthesize_voice_clone",
                    &[
                        PyArg::Str(&request.text),
                        PyArg::Bytes(request.reference_audio.as_deref().unwrap_or(&[])),
                        PyArg::Str(&request.language),
                        PyArg::Int(sample_rate),
                        PyArg::Str(model_id),
                    ],
                ),
            }
        };

        match result {
            Ok(wav) => {
                log::info!(
                    "synthesized {} bytes ({} mode, {} chars in)",
                    wav.len(),
                    request.mode,
                    request.text.len()
                );
                inner.last_error = None;
                Ok(SynthesisResult {
                    wav,
                    sample_rate: request.sample_rate,
                })
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Unload the active model. Tolerant of runner failure: the bridge
    /// reports the model gone afterwards either way.
    pub fn unload_model(&self) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        inner.require_module()?;

        let result = match inner.runtime.as_ref() {
            Some(runtime) => runtime.call_bool(&inner.module_name, "unload_model", &[]),
            None => return Err(BridgeError::NotInitialized),
        };

        inner.model_loaded = false;
        inner.active = None;
        inner.fallback_applied = false;
        match result {
            Ok(true) => inner.last_error = None,
            Ok(false) => {
                log::warn!("runner declined to unload; reporting model gone anyway");
                inner.last_error = Some("runner declined to unload".to_string());
            }
            Err(e) => {
                log::warn!("unload_model failed: {e}; reporting model gone anyway");
                inner.last_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    /// Preset speaker names supported by a custom-voice model, parsed from
    /// the runner's comma-separated list.
    pub fn supported_speakers(&self, selection: ModelSelection) -> BridgeResult<Vec<String>> {
        let mut inner = self.inner.lock();
        inner.require_module()?;

        let result = match inner.runtime.as_ref() {
            Some(runtime) => runtime.call_str(
                &inner.module_name,
                "get_supported_speakers_csv",
                &[
                    PyArg::Str(selection.mode.as_str()),
                    PyArg::Str(selection.model.as_str()),
                ],
            ),
            None => return Err(BridgeError::NotInitialized),
        };

        match result {
            Ok(csv) => {
                inner.last_error = None;
                Ok(parse_speaker_csv(&csv))
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Best-effort runtime diagnostics from the runner (debug aid). Failure
    /// is not recorded on status.
    pub fn diagnostics(&self) -> BridgeResult<String> {
        let inner = self.inner.lock();
        inner.require_module()?;
        match inner.runtime.as_ref() {
            Some(runtime) => runtime.call_str(&inner.module_name, "get_runtime_diagnostics", &[]),
            None => Err(BridgeError::NotInitialized),
        }
    }

    /// Snapshot the current state.
    pub fn status(&self) -> BridgeStatus {
        let inner = self.inner.lock();
        BridgeStatus {
            initialized: inner.runtime.is_some(),
            module_loaded: inner.module_loaded,
            model_loaded: inner.model_loaded,
            active_selection: inner.active,
            requested_selection: inner.requested,
            strict_load: inner.strict_load,
            fallback_applied: inner.fallback_applied,
            ready: inner.runtime.is_some() && inner.module_loaded && inner.model_loaded,
            last_error: inner.last_error.clone(),
        }
    }

    /// Tear down and reset to construction defaults. Idempotent; whether
    /// the interpreter is finalized follows
    /// [`BridgeOptions::finalize_on_shutdown`].
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(runtime) = inner.runtime.take() {
            runtime.shutdown(self.options.finalize_on_shutdown);
            log::info!("bridge shut down");
        }
        *inner = BridgeInner::default();
    }
}

impl BridgeInner {
    fn require_module(&self) -> BridgeResult<()> {
        if self.runtime.is_none() {
            return Err(BridgeError::NotInitialized);
        }
        if !self.module_loaded {
            return Err(BridgeError::ModuleNotLoaded);
        }
        Ok(())
    }

    fn load_model_locked(&mut self, selection: ModelSelection, strict: bool) -> BridgeResult<bool> {
        self.requested = Some(selection);
        self.strict_load = strict;

        let mut last_failure = String::from("no load candidates");
        let mut loaded: Option<ModelSelection> = None;
        {
            let runtime = match self.runtime.as_ref() {
                Some(runtime) => runtime,
                None => return Err(BridgeError::NotInitialized),
            };
            for candidate in candidates(selection, strict) {
                // Closed enums make this unreachable, but a mismatched pair
                // must never reach the runner.
                if candidate.model.mode() != candidate.mode {
                    continue;
                }
                log::info!("loading model {candidate}");
                let attempt = runtime.call_bool(
                    &self.module_name,
                    "load_model",
                    &[
                        PyArg::Str(candidate.mode.as_str()),
                        PyArg::Str(candidate.model.as_str()),
                        // Per-candidate strict: the native list owns the
                        // fallback walk, so the runner must not run its own.
                        PyArg::Str("1"),
                    ],
                );
                match attempt {
                    Ok(true) => {
                        loaded = Some(candidate);
                        break;
                    }
                    Ok(false) => {
                        last_failure = format!("runner declined to load {candidate}");
                        log::warn!("{last_failure}");
                    }
                    Err(e) => {
                        last_failure = e.to_string();
                        log::warn!("load attempt for {candidate} failed: {e}");
                    }
                }
            }
        }

        match loaded {
            Some(active) => {
                self.model_loaded = true;
                self.active = Some(active);
                self.fallback_applied = active != selection;
                self.last_error = None;
                if self.fallback_applied {
                    log::warn!("fallback applied: requested {selection}, active {active}");
                } else {
                    log::info!("model {active} loaded");
                }
                Ok(true)
            }
            None => {
                self.model_loaded = false;
                self.active = None;
                self.fallback_applied = false;
                self.last_error = Some(last_failure);
                Ok(false)
            }
        }
    }
}

/// Split the runner's comma-separated speaker list, trimming whitespace and
/// dropping empty entries.
fn parse_speaker_csv(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelIdentifier;
    use crate::request::SynthesisRequestBuilder;

    fn valid_request() -> SynthesisRequest {
        SynthesisRequestBuilder::default()
            .text("Hello")
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_speaker_csv() {
        assert_eq!(
            parse_speaker_csv("ryan, serena,  ,aiden,"),
            vec!["ryan", "serena", "aiden"]
        );
        assert!(parse_speaker_csv("").is_empty());
        assert!(parse_speaker_csv(" , ,").is_empty());
    }

    #[test]
    fn test_operations_require_initialize() {
        let bridge = QwenBridge::with_defaults();
        let selection = ModelSelection::for_mode(SynthesisMode::VoiceDesign);

        assert!(matches!(
            bridge.import_module(),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(
            bridge.load_model(selection, false),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(
            bridge.synthesize(&valid_request()),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(
            bridge.unload_model(),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(
            bridge.supported_speakers(selection),
            Err(BridgeError::NotInitialized)
        ));
        assert!(matches!(
            bridge.diagnostics(),
            Err(BridgeError::NotInitialized)
        ));

        // Precondition failures never partially mutate status.
        let status = bridge.status();
        assert!(!status.initialized);
        assert!(!status.module_loaded);
        assert!(!status.model_loaded);
        assert!(status.requested_selection.is_none());
        assert!(status.last_error.is_none());
        assert!(!status.ready);
    }

    #[test]
    fn test_invalid_request_rejected_before_state_checks() {
        let bridge = QwenBridge::with_defaults();
        let mut request = valid_request();
        request.text = "   ".to_string();
        assert!(matches!(
            bridge.synthesize(&request),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let bridge = QwenBridge::with_defaults();
        let fresh = bridge.status();

        bridge.shutdown();
        bridge.shutdown();

        assert_eq!(bridge.status(), fresh);
    }

    #[test]
    fn test_readiness_derivation_on_fresh_bridge() {
        let bridge = QwenBridge::with_defaults();
        let status = bridge.status();
        assert_eq!(
            status.ready,
            status.initialized && status.module_loaded && status.model_loaded
        );
    }

    #[test]
    fn test_status_serializes() {
        let status = QwenBridge::with_defaults().status();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ready"], serde_json::json!(false));
        assert_eq!(json["active_selection"], serde_json::Value::Null);
    }

    // End-to-end against a real libpython and a stub runner module.
    //
    // Skipped unless the environment points at an interpreter:
    //   QWEN_TTS_LIBPYTHON=/usr/lib/x86_64-linux-gnu/libpython3.12.so
    //   QWEN_TTS_PYTHON_HOME=/usr
    #[test]
    fn test_live_bridge_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();

        let (Ok(libpython), Ok(python_home)) = (
            std::env::var("QWEN_TTS_LIBPYTHON"),
            std::env::var("QWEN_TTS_PYTHON_HOME"),
        ) else {
            // Skip when no interpreter is staged in the test environment.
            return;
        };

        let stage = tempfile::tempdir().unwrap();
        std::fs::write(stage.path().join("bridge_stub_runner.py"), STUB_RUNNER).unwrap();

        let config = RuntimeConfiguration::new(&libpython, &python_home)
            .with_module_path(stage.path())
            .with_module_name("bridge_stub_runner");

        let bridge = QwenBridge::with_defaults();
        bridge.initialize(&config).unwrap();
        assert!(matches!(
            bridge.initialize(&config),
            Err(BridgeError::AlreadyInitialized)
        ));

        // Ops before import fail with module-not-loaded.
        let design = ModelSelection::for_mode(SynthesisMode::VoiceDesign);
        assert!(matches!(
            bridge.load_model(design, false),
            Err(BridgeError::ModuleNotLoaded)
        ));

        bridge.import_module().unwrap();
        assert!(bridge.status().module_loaded);

        // Scenario A: explicit load, then synthesis returns a WAV container.
        assert!(bridge.load_model(design, false).unwrap());
        let status = bridge.status();
        assert!(status.ready);
        assert!(!status.fallback_applied);
        assert_eq!(status.active_selection, Some(design));

        let result = bridge.synthesize(&valid_request()).unwrap();
        assert!(result.is_wav());
        assert!(!result.samples().unwrap().is_empty());

        // Scenario B: strict load of the unstaged checkpoint fails fast.
        let unstaged = ModelSelection::from(ModelIdentifier::CustomVoice17B);
        assert!(!bridge.load_model(unstaged, true).unwrap());
        let status = bridge.status();
        assert!(status.strict_load);
        assert!(!status.fallback_applied);
        assert!(!status.model_loaded);
        assert!(status.last_error.is_some());
        assert!(!status.ready);

        // Non-strict retry falls back to the same-mode sibling.
        assert!(bridge.load_model(unstaged, false).unwrap());
        let status = bridge.status();
        assert!(status.fallback_applied);
        assert_eq!(
            status.active_selection,
            Some(ModelSelection::from(ModelIdentifier::CustomVoice06B))
        );

        // Scenario C: synthesis targeting a different mode reloads first.
        let clone_request = SynthesisRequestBuilder::default()
            .text("Clone me")
            .mode(SynthesisMode::VoiceClone)
            .reference_audio(Some(vec![1u8; 32]))
            .build()
            .unwrap();
        let result = bridge.synthesize(&clone_request).unwrap();
        assert!(result.is_wav());
        assert_eq!(
            bridge.status().active_selection,
            Some(ModelSelection::for_mode(SynthesisMode::VoiceClone))
        );

        // Supplemented ops.
        let speakers = bridge
            .supported_speakers(ModelSelection::for_mode(SynthesisMode::CustomVoice))
            .unwrap();
        assert_eq!(speakers, vec!["ryan", "serena", "aiden"]);
        assert_eq!(bridge.diagnostics().unwrap(), "stub-runtime");

        bridge.unload_model().unwrap();
        assert!(!bridge.status().model_loaded);

        bridge.shutdown();
        bridge.shutdown();
        assert!(!bridge.status().initialized);
    }

    const STUB_RUNNER: &str = r#"
import io
import wave

MODEL_LOADED = False
ACTIVE = None


def load_model(mode, model_id, strict):
    global MODEL_LOADED, ACTIVE
    if "1.7B-CustomVoice" in model_id:
        return False
    MODEL_LOADED = True
    ACTIVE = (mode, model_id)
    return True


def unload_model():
    global MODEL_LOADED, ACTIVE
    MODEL_LOADED = False
    ACTIVE = None
    return True


def get_supported_speakers_csv(mode, model_id):
    return "ryan, serena,  ,aiden"


def get_runtime_diagnostics():
    return "stub-runtime"


def _wav():
    buf = io.BytesIO()
    with wave.open(buf, "wb") as w:
        w.setnchannels(1)
        w.setsampwidth(2)
        w.setframerate(24000)
        w.writeframes(b"\x00\x00" * 240)
    return buf.getvalue()


def synthesize_voice_design(text, voice, language, sample_rate, model_id):
    assert MODEL_LOADED
    return _wav()


def synthesize_custom_voice(text, voice, instruct, language, sample_rate, model_id):
    assert MODEL_LOADED
    return _wav()


def synthesize_voice_clone(text, reference_audio, language, sample_rate, model_id):
    assert MODEL_LOADED
    assert isinstance(reference_audio, bytes) and reference_audio
    return _wav()
"#;
}
