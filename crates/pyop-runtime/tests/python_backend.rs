//! CPython backend tests.
//!
//! Compiled only with the `python` feature and ignored by default because they
//! need an interpreter with numpy importable.
//!
//! Run with: `cargo test -p pyop-runtime --features python --test python_backend -- --include-ignored`
#![cfg(feature = "python")]

use std::sync::Arc;

use pyo3::prelude::*;
use pyop_core::{DataType, Tensor};
use pyop_runtime::{
    BindError, FunctionBinding, Marshaler, PythonRuntime, RuntimeConfig, RuntimeError,
    RuntimeHandle, RuntimeLifecycle,
};

const MATH_OPS: &std::ffi::CStr = c"
import numpy as np

def add_one(x):
    return x + 1

def as_float(x):
    return x.astype(np.float64)

def transpose(x):
    return x.T

def total(x):
    return x.sum()

def greet(x):
    return 'hello'

def fail(x):
    raise ValueError('bad input')

answer = 42
";

fn handle() -> RuntimeHandle<PythonRuntime> {
    static LIFECYCLE: std::sync::OnceLock<Arc<RuntimeLifecycle<PythonRuntime>>> =
        std::sync::OnceLock::new();
    let lifecycle = LIFECYCLE
        .get_or_init(|| RuntimeLifecycle::new(PythonRuntime::new(), RuntimeConfig::default()));
    let handle = lifecycle.acquire().expect("CPython with numpy is required");
    Python::with_gil(|py| {
        let module = PyModule::from_code(py, MATH_OPS, c"math_ops.py", c"math_ops").unwrap();
        py.import("sys")
            .unwrap()
            .getattr("modules")
            .unwrap()
            .set_item("math_ops", module)
            .unwrap();
    });
    handle
}

fn call(
    handle: &RuntimeHandle<PythonRuntime>,
    function: &str,
    input: &Tensor,
    output: DataType,
) -> Result<Tensor, RuntimeError> {
    handle.enter(|rt| {
        let binding = FunctionBinding::bind(rt, "math_ops", function)?;
        let m = Marshaler::new(rt);
        let result = binding.invoke(rt, vec![m.to_foreign(input)?])?;
        m.from_foreign(result, output)
    })
}

#[test]
#[ignore = "requires CPython with numpy"]
fn add_one_scenario() {
    let handle = handle();
    let input = Tensor::from_values(vec![2, 2], vec![1i32, 2, 3, 4]).unwrap();
    let output = call(&handle, "add_one", &input, DataType::Int32).unwrap();
    assert_eq!(output.shape(), &[2, 2]);
    assert_eq!(output.to_values::<i32>().unwrap(), vec![2, 3, 4, 5]);
}

#[test]
#[ignore = "requires CPython with numpy"]
fn round_trips_through_numpy() {
    let handle = handle();
    let tensors = [
        Tensor::from_values(vec![3], vec![1i32, -1, i32::MAX]).unwrap(),
        Tensor::from_values(vec![1, 2], vec![i64::MIN, 7]).unwrap(),
        Tensor::from_values(vec![2], vec![0.25f32, -8.0]).unwrap(),
        Tensor::from_values(vec![], vec![2.5f64]).unwrap(),
    ];
    for tensor in tensors {
        let back = handle
            .enter(|rt| {
                let m = Marshaler::new(rt);
                m.from_foreign(m.to_foreign(&tensor)?, tensor.dtype())
            })
            .unwrap();
        assert_eq!(back, tensor);
    }
}

#[test]
#[ignore = "requires CPython with numpy"]
fn strided_results_are_copied_in_logical_order() {
    let handle = handle();
    let input = Tensor::from_values(vec![2, 3], vec![1i64, 2, 3, 4, 5, 6]).unwrap();
    let output = call(&handle, "transpose", &input, DataType::Int64).unwrap();
    assert_eq!(output.shape(), &[3, 2]);
    assert_eq!(output.to_values::<i64>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
}

#[test]
#[ignore = "requires CPython with numpy"]
fn numpy_scalars_become_zero_d_arrays() {
    let handle = handle();
    let input = Tensor::from_values(vec![3], vec![1i64, 2, 3]).unwrap();
    let output = call(&handle, "total", &input, DataType::Int64).unwrap();
    assert_eq!(output.rank(), 0);
    assert_eq!(output.to_values::<i64>().unwrap(), vec![6]);
}

#[test]
#[ignore = "requires CPython with numpy"]
fn wrong_result_type_is_unsupported() {
    let handle = handle();
    let input = Tensor::from_values(vec![1], vec![1i32]).unwrap();
    let err = call(&handle, "as_float", &input, DataType::Int32).unwrap_err();
    assert!(
        matches!(&err, RuntimeError::UnsupportedType(msg) if msg.contains("holds float64, expected int32")),
        "{err}"
    );
}

#[test]
#[ignore = "requires CPython with numpy"]
fn exceptions_and_non_arrays_are_reported() {
    let handle = handle();
    let input = Tensor::from_values(vec![1], vec![1i32]).unwrap();
    let err = call(&handle, "fail", &input, DataType::Int32).unwrap_err();
    assert!(matches!(err, RuntimeError::Invocation(msg) if msg.contains("bad input")));
    let err = call(&handle, "greet", &input, DataType::Int32).unwrap_err();
    assert!(matches!(err, RuntimeError::UnsupportedResult(msg) if msg.contains("str")));
}

#[test]
#[ignore = "requires CPython with numpy"]
fn bind_failures() {
    let handle = handle();
    let err = handle
        .enter(|rt| Ok(FunctionBinding::bind(rt, "no_such_module_xyz", "f")))
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BindError::ModuleNotFound { .. }));
    let err = handle
        .enter(|rt| Ok(FunctionBinding::bind(rt, "math_ops", "answer")))
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BindError::NotCallable { .. }));
}
