//! Typed call marshaling across the native/interpreter boundary.
//!
//! Every public call here acquires the GIL for its full duration, converts
//! native arguments into interpreter objects, invokes a named function on the
//! runner module and extracts a typed result. Interpreter references are held
//! in [`PyRef`] guards so each acquisition has a paired release on every
//! exit path.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_long};
use std::ptr;
use std::slice;

use crate::error::{BridgeError, BridgeResult};

use super::interpreter::PyRuntime;
use super::symbols::{PyApi, PyObjectPtr};

/// A native argument value headed across the boundary.
#[derive(Debug, Clone, Copy)]
pub enum PyArg<'v> {
    /// UTF-8 string → interpreter `str`.
    Str(&'v str),
    /// Binary buffer → interpreter `bytes`.
    Bytes(&'v [u8]),
    /// Integer → interpreter `int`.
    Int(i64),
}

/// Owned reference to an interpreter object; decrements on drop.
///
/// `into_raw` forgets the release obligation for the cases where a C-API
/// call steals the reference.
struct PyRef<'a> {
    api: &'a PyApi,
    ptr: PyObjectPtr,
}

impl<'a> PyRef<'a> {
    fn from_owned(api: &'a PyApi, ptr: PyObjectPtr) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { api, ptr })
        }
    }

    fn as_ptr(&self) -> PyObjectPtr {
        self.ptr
    }

    fn into_raw(self) -> PyObjectPtr {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for PyRef<'_> {
    fn drop(&mut self) {
        unsafe { (self.api.dec_ref)(self.ptr) }
    }
}

impl PyRuntime {
    /// Import the runner module, discarding the handle. The interpreter
    /// caches imports, so this both validates the module and warms it.
    pub fn import(&self, module: &str) -> BridgeResult<()> {
        let _gil = self.gil();
        self.import_ref(module).map(drop)
    }

    /// Call `module.function(args...)` expecting a `bytes` result.
    pub fn call_bytes(
        &self,
        module: &str,
        function: &str,
        args: &[PyArg<'_>],
    ) -> BridgeResult<Vec<u8>> {
        let _gil = self.gil();
        let result = self.invoke(module, function, args)?;

        let api = self.api();
        let mut buf: *mut c_char = ptr::null_mut();
        let mut len: isize = 0;
        let rc = unsafe { (api.bytes_as_string_and_size)(result.as_ptr(), &mut buf, &mut len) };
        if rc != 0 || buf.is_null() {
            unsafe { (api.err_print)() };
            return Err(BridgeError::InvalidSynthesisReturnType {
                function: function.to_string(),
            });
        }
        let bytes = if len > 0 {
            unsafe { slice::from_raw_parts(buf as *const u8, len as usize) }.to_vec()
        } else {
            Vec::new()
        };
        Ok(bytes)
    }

    /// Call `module.function(args...)` expecting a truthy/falsy result.
    pub fn call_bool(
        &self,
        module: &str,
        function: &str,
        args: &[PyArg<'_>],
    ) -> BridgeResult<bool> {
        let _gil = self.gil();
        let result = self.invoke(module, function, args)?;

        let api = self.api();
        let rc = unsafe { (api.object_is_true)(result.as_ptr()) };
        if rc < 0 {
            unsafe { (api.err_print)() };
            return Err(BridgeError::python_call(function, "truthiness check failed"));
        }
        Ok(rc != 0)
    }

    /// Call `module.function(args...)` expecting a string result.
    pub fn call_str(
        &self,
        module: &str,
        function: &str,
        args: &[PyArg<'_>],
    ) -> BridgeResult<String> {
        let _gil = self.gil();
        let result = self.invoke(module, function, args)?;

        let api = self.api();
        let utf8 = unsafe { (api.unicode_as_utf8)(result.as_ptr()) };
        if utf8.is_null() {
            unsafe { (api.err_print)() };
            return Err(BridgeError::python_call(
                function,
                "result is not a UTF-8 string",
            ));
        }
        Ok(unsafe { CStr::from_ptr(utf8) }.to_string_lossy().into_owned())
    }

    fn import_ref(&self, module: &str) -> BridgeResult<PyRef<'_>> {
        let api = self.api();
        let cname = CString::new(module)
            .map_err(|_| BridgeError::import(module, "module name contains NUL"))?;
        match PyRef::from_owned(api, unsafe { (api.import_module)(cname.as_ptr()) }) {
            Some(handle) => Ok(handle),
            None => {
                unsafe { (api.err_print)() };
                Err(BridgeError::import(
                    module,
                    "import raised; see interpreter stderr",
                ))
            }
        }
    }

    /// Generic call path: import, resolve attribute, verify callable, build
    /// the argument tuple, invoke. The caller extracts the typed result and
    /// must hold the GIL for the lifetime of the returned reference.
    fn invoke<'s>(
        &'s self,
        module_name: &str,
        function: &str,
        args: &[PyArg<'_>],
    ) -> BridgeResult<PyRef<'s>> {
        let api = self.api();
        let module = self.import_ref(module_name)?;

        let cfunction = CString::new(function)
            .map_err(|_| BridgeError::python_call(function, "function name contains NUL"))?;
        let func = match PyRef::from_owned(api, unsafe {
            (api.get_attr_string)(module.as_ptr(), cfunction.as_ptr())
        }) {
            Some(func) => func,
            None => {
                unsafe { (api.err_print)() };
                return Err(BridgeError::python_call(function, "attribute missing"));
            }
        };
        if unsafe { (api.callable_check)(func.as_ptr()) } == 0 {
            return Err(BridgeError::python_call(function, "attribute is not callable"));
        }

        let tuple = match PyRef::from_owned(api, unsafe { (api.tuple_new)(args.len() as isize) }) {
            Some(tuple) => tuple,
            None => {
                unsafe { (api.err_print)() };
                return Err(BridgeError::python_call(
                    function,
                    "failed to allocate argument tuple",
                ));
            }
        };

        for (index, arg) in args.iter().enumerate() {
            let value = self.build_value(function, arg)?;
            // PyTuple_SetItem steals the reference on success; on failure
            // the reference is still ours to release.
            let raw = value.into_raw();
            if unsafe { (api.tuple_set_item)(tuple.as_ptr(), index as isize, raw) } != 0 {
                unsafe {
                    (api.dec_ref)(raw);
                    (api.err_print)();
                }
                return Err(BridgeError::python_call(
                    function,
                    format!("failed to place argument {index}"),
                ));
            }
        }

        match PyRef::from_owned(api, unsafe {
            (api.call_object)(func.as_ptr(), tuple.as_ptr())
        }) {
            Some(result) => Ok(result),
            None => {
                unsafe { (api.err_print)() };
                Err(BridgeError::python_call(
                    function,
                    "call raised; see interpreter stderr",
                ))
            }
        }
    }

    fn build_value<'s>(&'s self, function: &str, arg: &PyArg<'_>) -> BridgeResult<PyRef<'s>> {
        let api = self.api();
        let ptr = match arg {
            PyArg::Str(s) => {
                let c = CString::new(*s).map_err(|_| {
                    BridgeError::python_call(function, "string argument contains NUL")
                })?;
                unsafe { (api.unicode_from_string)(c.as_ptr()) }
            }
            PyArg::Bytes(b) => unsafe {
                (api.bytes_from_string_and_size)(b.as_ptr() as *const c_char, b.len() as isize)
            },
            PyArg::Int(v) => unsafe { (api.long_from_long)(*v as c_long) },
        };
        match PyRef::from_owned(api, ptr) {
            Some(value) => Ok(value),
            None => {
                unsafe { (api.err_print)() };
                Err(BridgeError::python_call(
                    function,
                    "argument construction failed",
                ))
            }
        }
    }
}
