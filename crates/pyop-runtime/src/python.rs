//! CPython backend with numpy as the array extension.

use numpy::{
    Element, PyArray1, PyArrayDescrMethods, PyArrayDyn, PyArrayMethods, PyUntypedArray,
    PyUntypedArrayMethods,
};
use pyo3::prelude::*;
use pyo3::types::{PyList, PyTuple};
use pyo3::{IntoPyObjectExt, PyErr};

use pyop_core::TensorElement;
use pyop_core::tensor::{decode_values, encode_values};

use crate::config::RuntimeConfig;
use crate::dtype::ElementKind;
use crate::error::{BindError, RuntimeError};
use crate::foreign::{DecodedArray, ForeignRuntime};
use crate::with_element_type;

/// The process's CPython interpreter plus numpy.
#[derive(Default)]
pub struct PythonRuntime {
    numpy: Option<Py<PyModule>>,
}

impl PythonRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

fn describe_exception(py: Python<'_>, err: &PyErr) -> String {
    let mut message = err.to_string();
    if let Some(traceback) = err.traceback(py).and_then(|tb| tb.format().ok()) {
        message.push('\n');
        message.push_str(traceback.trim_end());
    }
    message
}

fn type_name(object: &Bound<'_, PyAny>) -> String {
    object
        .get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<unknown>".into())
}

fn to_numpy<T: TensorElement + Element>(
    py: Python<'_>,
    shape: &[usize],
    bytes: &[u8],
) -> Result<Py<PyAny>, RuntimeError> {
    let values = decode_values::<T>(bytes);
    let array = PyArray1::from_vec(py, values)
        .reshape(shape.to_vec())
        .map_err(|e| RuntimeError::Resource(format!("numpy allocation failed: {e}")))?;
    Ok(array.into_any().unbind())
}

fn from_numpy<T: TensorElement + Element>(
    object: &Bound<'_, PyAny>,
    kind: ElementKind,
) -> Result<DecodedArray, RuntimeError> {
    let array = object.downcast::<PyArrayDyn<T>>().map_err(|_| {
        let found = match object.downcast::<PyUntypedArray>() {
            Ok(untyped) => {
                let descr = untyped.dtype();
                // numpy's array-interface code, e.g. "f8" for float64.
                let code = format!("{}{}", descr.kind() as char, descr.itemsize());
                match ElementKind::from_type_code(&code) {
                    Some(other) => {
                        return RuntimeError::UnsupportedType(format!(
                            "foreign array holds {other}, expected {kind}"
                        ));
                    }
                    None => format!("ndarray of {descr}"),
                }
            }
            Err(_) => type_name(object),
        };
        RuntimeError::UnsupportedType(format!("{found} is not an array of {kind}"))
    })?;
    let shape = array.shape().to_vec();
    let readonly = array
        .try_readonly()
        .map_err(|e| RuntimeError::Invocation(format!("result array is not readable: {e}")))?;
    // Iterating the view copies in logical order, so strided results work too.
    let values: Vec<T> = readonly.as_array().iter().copied().collect();
    Ok(DecodedArray {
        shape,
        bytes: encode_values(&values),
    })
}

impl ForeignRuntime for PythonRuntime {
    type Object = Py<PyAny>;
    type Callable = Py<PyAny>;

    fn name(&self) -> &'static str {
        "python"
    }

    fn initialize(&mut self, config: &RuntimeConfig) -> Result<(), RuntimeError> {
        pyo3::prepare_freethreaded_python();
        let numpy = Python::with_gil(|py| -> Result<Py<PyModule>, RuntimeError> {
            let numpy = py.import("numpy").map_err(|e| {
                RuntimeError::Resource(format!("numpy extension unavailable: {e}"))
            })?;
            let path = py
                .import("sys")
                .and_then(|sys| sys.getattr("path"))
                .and_then(|path| path.downcast_into::<PyList>().map_err(PyErr::from))
                .map_err(|e| RuntimeError::Resource(format!("sys.path unavailable: {e}")))?;
            for (index, dir) in config.search_paths.iter().enumerate() {
                path.insert(index, dir.to_string_lossy().as_ref())
                    .map_err(|e| RuntimeError::Resource(format!("cannot extend sys.path: {e}")))?;
            }
            tracing::debug!(
                version = %py.version(),
                numpy = numpy
                    .getattr("__version__")
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                "CPython ready"
            );
            Ok(numpy.unbind())
        })?;
        self.numpy = Some(numpy);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), RuntimeError> {
        Python::with_gil(|_py| drop(self.numpy.take()));
        // SAFETY: the lifecycle finalizes only once, under its lock, after the
        // last owner has released its callable. No Python object created by
        // this runtime is reachable any more. The GIL state is taken without
        // a matching release because the interpreter does not survive.
        let status = unsafe {
            pyo3::ffi::PyGILState_Ensure();
            pyo3::ffi::Py_FinalizeEx()
        };
        if status != 0 {
            return Err(RuntimeError::Resource(format!(
                "Py_FinalizeEx reported status {status}"
            )));
        }
        Ok(())
    }

    fn new_array(
        &self,
        kind: ElementKind,
        shape: &[usize],
        bytes: &[u8],
    ) -> Result<Py<PyAny>, RuntimeError> {
        Python::with_gil(|py| with_element_type!(kind, T => to_numpy::<T>(py, shape, bytes)))
    }

    fn new_scalar(&self, kind: ElementKind, bytes: &[u8]) -> Result<Py<PyAny>, RuntimeError> {
        Python::with_gil(|py| {
            with_element_type!(kind, T => T::read_from(bytes).into_py_any(py))
                .map_err(|e| RuntimeError::Resource(format!("cannot build {kind} scalar: {e}")))
        })
    }

    fn is_array(&self, object: &Py<PyAny>) -> bool {
        Python::with_gil(|py| object.bind(py).downcast::<PyUntypedArray>().is_ok())
    }

    fn take_array(
        &self,
        object: Py<PyAny>,
        kind: ElementKind,
    ) -> Result<DecodedArray, RuntimeError> {
        Python::with_gil(|py| {
            let object = object.into_bound(py);
            with_element_type!(kind, T => from_numpy::<T>(&object, kind))
        })
    }

    fn describe(&self, object: &Py<PyAny>) -> String {
        Python::with_gil(|py| type_name(object.bind(py)))
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<Py<PyAny>, BindError> {
        Python::with_gil(|py| {
            let imported = py.import(module).map_err(|e| BindError::ModuleNotFound {
                module: module.into(),
                reason: e.to_string(),
            })?;
            let attr = imported
                .getattr(symbol)
                .map_err(|_| BindError::MissingSymbol {
                    module: module.into(),
                    symbol: symbol.into(),
                })?;
            if !attr.is_callable() {
                return Err(BindError::NotCallable {
                    module: module.into(),
                    symbol: symbol.into(),
                });
            }
            Ok(attr.unbind())
        })
    }

    fn call(
        &self,
        callable: &Py<PyAny>,
        args: Vec<Py<PyAny>>,
    ) -> Result<Py<PyAny>, RuntimeError> {
        Python::with_gil(|py| {
            let args = PyTuple::new(py, args)
                .map_err(|e| RuntimeError::Invocation(describe_exception(py, &e)))?;
            let mut result = callable
                .bind(py)
                .call1(args)
                .map_err(|e| RuntimeError::Invocation(describe_exception(py, &e)))?;
            // numpy collapses 0-d results to scalars; give them their array back.
            if let Some(numpy) = &self.numpy {
                let numpy = numpy.bind(py);
                let is_generic = numpy
                    .getattr("generic")
                    .and_then(|generic| result.is_instance(&generic))
                    .unwrap_or(false);
                if is_generic {
                    result = numpy
                        .call_method1("asarray", (result,))
                        .map_err(|e| RuntimeError::Invocation(describe_exception(py, &e)))?;
                }
            }
            Ok(result.unbind())
        })
    }

    fn release_callable(&self, callable: Py<PyAny>) {
        Python::with_gil(|_py| drop(callable));
    }
}
