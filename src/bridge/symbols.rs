//! Dynamic resolution of the interpreter C-API.
//!
//! The bridge never links against `libpython`; it opens the library named in
//! the runtime configuration and resolves a fixed set of symbols once. The
//! resulting [`PyApi`] table is immutable and shared read-only by every call.

use std::os::raw::{c_char, c_int, c_long, c_void};
use std::path::Path;

use libloading::Library;

use crate::error::{BridgeError, BridgeResult};

/// Borrowed or owned pointer to an interpreter object.
pub type PyObjectPtr = *mut c_void;
/// Opaque interpreter thread-state handle.
pub type PyThreadStatePtr = *mut c_void;
/// Opaque GIL-state token returned by the ensure call.
pub type PyGilState = c_int;

/// Typed function-pointer table over the interpreter C-API.
///
/// Resolution is all-or-nothing: a single missing symbol fails construction
/// with [`BridgeError::MissingSymbol`] rather than leaving partial bindings.
#[derive(Clone, Copy)]
pub struct PyApi {
    // Lifecycle
    pub initialize_ex: unsafe extern "C" fn(c_int),
    pub finalize_ex: unsafe extern "C" fn() -> c_int,
    pub is_initialized: unsafe extern "C" fn() -> c_int,

    // Import
    pub import_module: unsafe extern "C" fn(*const c_char) -> PyObjectPtr,

    // Attribute / callable introspection
    pub get_attr_string: unsafe extern "C" fn(PyObjectPtr, *const c_char) -> PyObjectPtr,
    pub callable_check: unsafe extern "C" fn(PyObjectPtr) -> c_int,

    // Value construction
    pub tuple_new: unsafe extern "C" fn(isize) -> PyObjectPtr,
    pub tuple_set_item: unsafe extern "C" fn(PyObjectPtr, isize, PyObjectPtr) -> c_int,
    pub unicode_from_string: unsafe extern "C" fn(*const c_char) -> PyObjectPtr,
    pub long_from_long: unsafe extern "C" fn(c_long) -> PyObjectPtr,
    pub bytes_from_string_and_size: unsafe extern "C" fn(*const c_char, isize) -> PyObjectPtr,

    // Invocation and result extraction
    pub call_object: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub bytes_as_string_and_size:
        unsafe extern "C" fn(PyObjectPtr, *mut *mut c_char, *mut isize) -> c_int,
    pub unicode_as_utf8: unsafe extern "C" fn(PyObjectPtr) -> *const c_char,
    pub object_is_true: unsafe extern "C" fn(PyObjectPtr) -> c_int,
    pub dec_ref: unsafe extern "C" fn(PyObjectPtr),
    pub err_print: unsafe extern "C" fn(),

    // Thread / lock control
    pub gil_ensure: unsafe extern "C" fn() -> PyGilState,
    pub gil_release: unsafe extern "C" fn(PyGilState),
    pub save_thread: unsafe extern "C" fn() -> PyThreadStatePtr,
    pub restore_thread: unsafe extern "C" fn(PyThreadStatePtr),
}

impl std::fmt::Debug for PyApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PyApi { .. }")
    }
}

impl PyApi {
    /// Resolve every required symbol from an opened interpreter library.
    pub fn load(lib: &Library) -> BridgeResult<Self> {
        unsafe {
            Ok(Self {
                initialize_ex: resolve(lib, b"Py_InitializeEx\0")?,
                finalize_ex: resolve(lib, b"Py_FinalizeEx\0")?,
                is_initialized: resolve(lib, b"Py_IsInitialized\0")?,
                import_module: resolve(lib, b"PyImport_ImportModule\0")?,
                get_attr_string: resolve(lib, b"PyObject_GetAttrString\0")?,
                callable_check: resolve(lib, b"PyCallable_Check\0")?,
                tuple_new: resolve(lib, b"PyTuple_New\0")?,
                tuple_set_item: resolve(lib, b"PyTuple_SetItem\0")?,
                unicode_from_string: resolve(lib, b"PyUnicode_FromString\0")?,
                long_from_long: resolve(lib, b"PyLong_FromLong\0")?,
                bytes_from_string_and_size: resolve(lib, b"PyBytes_FromStringAndSize\0")?,
                call_object: resolve(lib, b"PyObject_CallObject\0")?,
                bytes_as_string_and_size: resolve(lib, b"PyBytes_AsStringAndSize\0")?,
                unicode_as_utf8: resolve(lib, b"PyUnicode_AsUTF8\0")?,
                object_is_true: resolve(lib, b"PyObject_IsTrue\0")?,
                dec_ref: resolve(lib, b"Py_DecRef\0")?,
                err_print: resolve(lib, b"PyErr_Print\0")?,
                gil_ensure: resolve(lib, b"PyGILState_Ensure\0")?,
                gil_release: resolve(lib, b"PyGILState_Release\0")?,
                save_thread: resolve(lib, b"PyEval_SaveThread\0")?,
                restore_thread: resolve(lib, b"PyEval_RestoreThread\0")?,
            })
        }
    }
}

unsafe fn resolve<T: Copy>(lib: &Library, name: &'static [u8]) -> BridgeResult<T> {
    match lib.get::<T>(name) {
        Ok(symbol) => Ok(*symbol),
        Err(_) => Err(BridgeError::MissingSymbol(
            String::from_utf8_lossy(&name[..name.len() - 1]).into_owned(),
        )),
    }
}

/// Open the interpreter library for immediate, global-scope resolution.
///
/// Global scope matters: the interpreter's own C-extension loader resolves
/// `Py*` symbols transitively from the process image, which only works when
/// the library was opened with `RTLD_GLOBAL`.
#[cfg(unix)]
pub fn open_library(path: &Path) -> BridgeResult<Library> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    match unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) } {
        Ok(lib) => Ok(lib.into()),
        Err(e) => Err(BridgeError::LibraryLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
pub fn open_library(path: &Path) -> BridgeResult<Library> {
    match unsafe { Library::new(path) } {
        Ok(lib) => Ok(lib),
        Err(e) => Err(BridgeError::LibraryLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_library_is_fatal() {
        let err = open_library(&PathBuf::from("/nonexistent/libpython3.12.so")).unwrap_err();
        assert!(matches!(err, BridgeError::LibraryLoad { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_symbol_is_fatal() {
        // libc is present on any unix test host but exports no Py_* symbols.
        let candidates = ["/lib/x86_64-linux-gnu/libc.so.6", "/usr/lib/libc.so.6"];
        let Some(lib) = candidates
            .iter()
            .find_map(|p| open_library(Path::new(p)).ok())
        else {
            return;
        };
        let err = PyApi::load(&lib).unwrap_err();
        assert!(matches!(err, BridgeError::MissingSymbol(_)));
    }
}
