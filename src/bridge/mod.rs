//! Embedded CPython bridge.
//!
//! This module owns the entire native/interpreter boundary:
//!
//! - [`symbols`] opens `libpython` and resolves a fixed C-API table;
//! - [`interpreter`] initializes the interpreter once, hands the GIL back
//!   after init and finalizes on shutdown only when asked to;
//! - [`marshal`] converts typed requests into interpreter calls with
//!   explicit reference-counting and GIL discipline;
//! - [`engine`] serializes everything behind one mutex and tracks the
//!   observable [`BridgeStatus`].
//!
//! All `unsafe` FFI in the crate lives under this module. Call sites above
//! it only ever see typed wrappers.
//!
//! # Process-lifetime constraints
//!
//! The embedded interpreter is not safely re-initializable after finalize
//! without a process restart, and only one live handle to it may exist per
//! process. Create one [`QwenBridge`] and keep it for the life of the
//! service; a replacement bridge in the same process will adopt the
//! still-running interpreter rather than re-initialize it.

pub mod engine;
pub mod interpreter;
pub mod marshal;
pub mod symbols;

pub use engine::{BridgeStatus, QwenBridge};
