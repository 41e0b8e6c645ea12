//! Interpreter lifecycle: environment setup, one-time initialization, GIL
//! handover and opt-in finalization.

use std::env;

use libloading::Library;

use crate::config::{RuntimeConfiguration, PYTHON_HOME_ENV, PYTHON_PATH_ENV};
use crate::error::{BridgeError, BridgeResult};

use super::symbols::{open_library, PyApi, PyGilState, PyThreadStatePtr};

/// A running embedded interpreter.
///
/// Holds the opened library, the resolved C-API table and, when this process
/// performed the initialization, the thread state saved by releasing the GIL
/// so that any native thread can acquire it for subsequent calls.
pub struct PyRuntime {
    api: PyApi,
    lib: Option<Library>,
    saved_state: Option<PyThreadStatePtr>,
}

// The thread-state pointer is only ever consumed under the GIL discipline
// below, and the GILState API is explicitly designed for calls from
// arbitrary native threads.
unsafe impl Send for PyRuntime {}

impl PyRuntime {
    /// Open the interpreter library, resolve its API and initialize it.
    ///
    /// If a previous bridge instance in this process left the interpreter
    /// running (finalize is opt-in), the existing interpreter is adopted
    /// as-is: re-initializing is skipped and, critically, the GIL is not
    /// released a second time.
    pub fn start(config: &RuntimeConfiguration) -> BridgeResult<Self> {
        let lib = open_library(&config.library_path)?;
        let api = PyApi::load(&lib)?;

        configure_environment(config)?;

        let saved_state = unsafe {
            if (api.is_initialized)() != 0 {
                log::info!("interpreter already initialized; adopting existing runtime");
                None
            } else {
                // 0 = do not install signal handlers; the host process owns
                // signal disposition.
                (api.initialize_ex)(0);
                if (api.is_initialized)() == 0 {
                    return Err(BridgeError::initialize(
                        "interpreter did not report initialized after Py_InitializeEx",
                    ));
                }
                log::info!(
                    "interpreter initialized from {}",
                    config.library_path.display()
                );
                // Drop the GIL held by the initializing thread so other
                // native threads can acquire it.
                Some((api.save_thread)())
            }
        };

        Ok(Self {
            api,
            lib: Some(lib),
            saved_state,
        })
    }

    /// The resolved C-API table.
    pub fn api(&self) -> &PyApi {
        &self.api
    }

    /// Acquire the GIL for the current thread.
    pub fn gil(&self) -> GilGuard<'_> {
        let state = unsafe { (self.api.gil_ensure)() };
        GilGuard {
            api: &self.api,
            state,
        }
    }

    /// Tear the runtime down.
    ///
    /// With `finalize` false this only releases the native handle state: the
    /// library is deliberately leaked rather than closed, because the
    /// interpreter stays resident and unmapping live extension code would
    /// crash any background thread still running it. With `finalize` true
    /// the saved thread state is restored (the finalizing thread must hold
    /// the GIL), the interpreter is finalized and the library is closed.
    pub fn shutdown(mut self, finalize: bool) {
        let lib = self.lib.take();

        if !finalize {
            log::debug!("shutdown without finalize; interpreter stays resident");
            if let Some(lib) = lib {
                std::mem::forget(lib);
            }
            return;
        }

        unsafe {
            if (self.api.is_initialized)() != 0 {
                match self.saved_state.take() {
                    Some(state) => (self.api.restore_thread)(state),
                    // Adopted interpreter: no saved state, take the GIL the
                    // ordinary way.
                    None => {
                        (self.api.gil_ensure)();
                    }
                }
                if (self.api.finalize_ex)() != 0 {
                    log::warn!("Py_FinalizeEx reported errors during interpreter shutdown");
                }
            }
        }
        drop(lib);
    }
}

/// Scoped GIL hold; released on drop, including on early-error paths.
pub struct GilGuard<'a> {
    api: &'a PyApi,
    state: PyGilState,
}

impl Drop for GilGuard<'_> {
    fn drop(&mut self) {
        unsafe { (self.api.gil_release)(self.state) }
    }
}

/// Export `PYTHONHOME` and `PYTHONPATH` before the interpreter initializes.
/// This is the canonical way the embedded interpreter discovers its standard
/// library and third-party packages.
fn configure_environment(config: &RuntimeConfiguration) -> BridgeResult<()> {
    let python_path = config.python_path_value()?;
    env::set_var(PYTHON_HOME_ENV, &config.python_home);
    if !python_path.is_empty() {
        env::set_var(PYTHON_PATH_ENV, &python_path);
    }
    log::debug!(
        "environment configured: {}={} {}={:?}",
        PYTHON_HOME_ENV,
        config.python_home.display(),
        PYTHON_PATH_ENV,
        python_path
    );
    Ok(())
}
