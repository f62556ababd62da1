//! Embedded foreign runtime for the PyOp bridge.
//!
//! A [`ForeignRuntime`] is an interpreter with a numeric-array extension.
//! [`RuntimeLifecycle`] owns the single process-wide instance: it initializes
//! it on first [`acquire`](RuntimeLifecycle::acquire) and serializes every
//! entry into it behind one lock. Inside that critical section the
//! [`Marshaler`] deep-copies host tensors into foreign arrays and back, and a
//! [`FunctionBinding`] calls a function resolved by module and symbol name.
//!
//! ```rust
//! use pyop_core::{DataType, Tensor};
//! use pyop_runtime::{FunctionBinding, Marshaler, NativeRuntime, RuntimeConfig, RuntimeLifecycle};
//!
//! # fn run() -> Result<(), pyop_runtime::RuntimeError> {
//! let lifecycle = RuntimeLifecycle::new(NativeRuntime::with_standard_library(), RuntimeConfig::default());
//! let handle = lifecycle.acquire()?;
//! let input = Tensor::from_values(vec![2], vec![1i32, 2]).unwrap();
//! let output = handle.enter(|rt| {
//!     let add_one = FunctionBinding::bind(rt, "math_ops", "add_one")?;
//!     let marshaler = Marshaler::new(rt);
//!     let result = add_one.invoke(rt, vec![marshaler.to_foreign(&input)?])?;
//!     marshaler.from_foreign(result, DataType::Int32)
//! })?;
//! assert_eq!(output.to_values::<i32>().unwrap(), vec![2, 3]);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! Backends: [`native`] is always available; `python` (CPython + numpy) is
//! behind the `python` cargo feature.

pub mod binding;
pub mod config;
pub mod dtype;
pub mod error;
pub mod foreign;
pub mod lifecycle;
pub mod marshal;
pub mod native;
#[cfg(feature = "python")]
pub mod python;

pub use binding::FunctionBinding;
pub use config::{RuntimeConfig, TeardownPolicy};
pub use dtype::{ELEMENT_TABLE, ElementKind, ElementSpec};
pub use error::{BindError, RuntimeError};
pub use foreign::{DecodedArray, ForeignRuntime};
pub use lifecycle::{RuntimeHandle, RuntimeLifecycle};
pub use marshal::Marshaler;
pub use native::{NativeHeap, NativeModule, NativeObject, NativeRuntime, NativeStats};
#[cfg(feature = "python")]
pub use python::PythonRuntime;
