//! Runtime configuration for the embedded interpreter.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Environment variable the interpreter reads to locate its installation.
pub const PYTHON_HOME_ENV: &str = "PYTHONHOME";
/// Environment variable the interpreter reads for extra module search paths.
pub const PYTHON_PATH_ENV: &str = "PYTHONPATH";

/// Default name of the runner module imported by the bridge.
pub const DEFAULT_MODULE_NAME: &str = "qwen_tts_runner";

/// Where the interpreter lives and how to find the runner module.
///
/// Immutable once constructed; supplied to
/// [`QwenBridge::initialize`](crate::bridge::QwenBridge::initialize) by
/// whoever starts the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfiguration {
    /// Path to the interpreter shared library (e.g. `libpython3.12.so`).
    pub library_path: PathBuf,
    /// Interpreter installation prefix, exported as `PYTHONHOME`.
    pub python_home: PathBuf,
    /// Ordered module search paths, exported joined as `PYTHONPATH`.
    pub module_paths: Vec<PathBuf>,
    /// Name of the runner module to import.
    pub module_name: String,
}

impl RuntimeConfiguration {
    /// Create a configuration with no extra search paths and the default
    /// runner module name.
    pub fn new(library_path: impl Into<PathBuf>, python_home: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            python_home: python_home.into(),
            module_paths: Vec::new(),
            module_name: DEFAULT_MODULE_NAME.to_string(),
        }
    }

    /// Append a module search path.
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_paths.push(path.into());
        self
    }

    /// Override the runner module name.
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// The `PYTHONPATH` value: search paths joined with the platform's
    /// path-list separator (`:` on unix).
    pub fn python_path_value(&self) -> BridgeResult<OsString> {
        env::join_paths(&self.module_paths)
            .map_err(|e| BridgeError::initialize(format!("invalid module search path: {e}")))
    }
}

/// Service-boundary knobs read from the process environment.
///
/// These mirror the `TTM_QWEN_*` variables the Python runner itself consumes,
/// so one environment configures both sides of the bridge. Device, dtype and
/// attention-implementation selectors are read by the runner directly and are
/// deliberately not validated here; an invalid value surfaces at model-load
/// time through the fallback/strict-load error path.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeOptions {
    /// Finalize the interpreter on shutdown. Off by default: finalizing
    /// while native extension background threads are alive can crash the
    /// process, so keeping the interpreter resident is the safe default.
    pub finalize_on_shutdown: bool,
    /// Enable verbose bridge logging.
    pub debug: bool,
    /// Deadline the surrounding service should apply per synthesis call.
    /// The bridge itself never times out an interpreter call; interrupting
    /// interpreter execution is unsafe.
    pub synth_timeout: Duration,
}

/// `TTM_QWEN_FINALIZE_ON_SHUTDOWN=1` enables finalize-on-shutdown.
pub const FINALIZE_ENV: &str = "TTM_QWEN_FINALIZE_ON_SHUTDOWN";
/// `TTM_QWEN_DEBUG=1` enables verbose bridge logging.
pub const DEBUG_ENV: &str = "TTM_QWEN_DEBUG";
/// `TTM_QWEN_SYNTH_TIMEOUT_SECS` overrides the recommended service deadline.
pub const SYNTH_TIMEOUT_ENV: &str = "TTM_QWEN_SYNTH_TIMEOUT_SECS";

const DEFAULT_SYNTH_TIMEOUT_SECS: u64 = 120;

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            finalize_on_shutdown: false,
            debug: false,
            synth_timeout: Duration::from_secs(DEFAULT_SYNTH_TIMEOUT_SECS),
        }
    }
}

impl BridgeOptions {
    /// Read options from the process environment, falling back to defaults
    /// for unset or unparseable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = env::var(SYNTH_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SYNTH_TIMEOUT_SECS);

        Self {
            finalize_on_shutdown: env_flag(FINALIZE_ENV, defaults.finalize_on_shutdown),
            debug: env_flag(DEBUG_ENV, defaults.debug),
            synth_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => v.trim() == "1",
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_builders() {
        let config = RuntimeConfiguration::new("/opt/python/lib/libpython3.12.so", "/opt/python")
            .with_module_path("/opt/runner")
            .with_module_path("/opt/site-packages")
            .with_module_name("runner_stub");

        assert_eq!(config.module_paths.len(), 2);
        assert_eq!(config.module_name, "runner_stub");

        let joined = config.python_path_value().unwrap();
        #[cfg(unix)]
        assert_eq!(joined.to_str().unwrap(), "/opt/runner:/opt/site-packages");
    }

    #[test]
    fn test_empty_module_paths_join_to_empty() {
        let config = RuntimeConfiguration::new("libpython3.12.so", "/usr");
        assert!(config.python_path_value().unwrap().is_empty());
    }

    #[test]
    fn test_options_defaults() {
        let options = BridgeOptions::default();
        assert!(!options.finalize_on_shutdown);
        assert!(!options.debug);
        assert_eq!(options.synth_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_options_from_env() {
        env::set_var(FINALIZE_ENV, "1");
        env::set_var(SYNTH_TIMEOUT_ENV, "15");
        let options = BridgeOptions::from_env();
        env::remove_var(FINALIZE_ENV);
        env::remove_var(SYNTH_TIMEOUT_ENV);

        assert!(options.finalize_on_shutdown);
        assert_eq!(options.synth_timeout, Duration::from_secs(15));

        env::set_var(SYNTH_TIMEOUT_ENV, "not-a-number");
        let options = BridgeOptions::from_env();
        env::remove_var(SYNTH_TIMEOUT_ENV);
        assert_eq!(options.synth_timeout, Duration::from_secs(120));
    }
}
