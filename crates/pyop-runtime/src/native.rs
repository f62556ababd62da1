//! In-process embedded runtime whose modules are Rust functions.
//!
//! Objects live in the runtime's own heap: every array owns a private byte
//! buffer, and the heap keeps counters so that allocation and release can be
//! observed from the outside.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pyop_core::{TensorElement, TensorError};
use pyop_core::tensor::{decode_values, element_count, encode_values};

use crate::config::RuntimeConfig;
use crate::dtype::ElementKind;
use crate::error::{BindError, RuntimeError};
use crate::foreign::{DecodedArray, ForeignRuntime};
use crate::with_element_type;

/// Counters describing what a [`NativeRuntime`] has done so far.
#[derive(Debug, Default)]
pub struct NativeStats {
    initializations: AtomicUsize,
    finalizations: AtomicUsize,
    allocations: AtomicUsize,
    live_objects: AtomicUsize,
    calls: AtomicUsize,
}

impl NativeStats {
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn finalizations(&self) -> usize {
        self.finalizations.load(Ordering::SeqCst)
    }

    /// Objects allocated since the runtime was created.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Objects allocated and not yet released.
    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct LiveToken(Arc<NativeStats>);

impl LiveToken {
    fn new(stats: &Arc<NativeStats>) -> Self {
        stats.allocations.fetch_add(1, Ordering::SeqCst);
        stats.live_objects.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(stats))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.live_objects.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeArray {
    kind: ElementKind,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NativeArray {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The elements as `T`, or `None` if `T` is not this array's kind.
    pub fn values<T: TensorElement>(&self) -> Option<Vec<T>> {
        (T::DTYPE == self.kind.host()).then(|| decode_values(&self.data))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Array(NativeArray),
    Scalar { kind: ElementKind, bytes: Vec<u8> },
    Text(String),
    None,
}

/// A value owned by the native runtime's heap.
#[derive(Debug)]
pub struct NativeObject {
    value: NativeValue,
    _live: LiveToken,
}

impl NativeObject {
    pub fn value(&self) -> &NativeValue {
        &self.value
    }

    pub fn as_array(&self) -> Option<&NativeArray> {
        match &self.value {
            NativeValue::Array(array) => Some(array),
            _ => None,
        }
    }
}

/// Allocator handed to native functions for building their results.
#[derive(Debug, Clone, Default)]
pub struct NativeHeap {
    stats: Arc<NativeStats>,
}

impl NativeHeap {
    fn alloc(&self, value: NativeValue) -> NativeObject {
        NativeObject {
            value,
            _live: LiveToken::new(&self.stats),
        }
    }

    /// Wraps a raw buffer as an array. The buffer is not checked against the
    /// shape here; taking the array back out rejects any length mismatch.
    pub fn array_from_bytes(
        &self,
        kind: ElementKind,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> NativeObject {
        self.alloc(NativeValue::Array(NativeArray { kind, shape, data }))
    }

    pub fn array_from_values<T: TensorElement>(
        &self,
        shape: Vec<usize>,
        values: Vec<T>,
    ) -> Result<NativeObject, String> {
        let kind = ElementKind::for_host(T::DTYPE).map_err(|e| e.to_string())?;
        let expected = element_count(&shape).map_err(|e| e.to_string())?;
        if values.len() != expected {
            return Err(format!(
                "shape {shape:?} needs {expected} values, got {}",
                values.len()
            ));
        }
        Ok(self.array_from_bytes(kind, shape, encode_values(&values)))
    }

    pub fn scalar(&self, kind: ElementKind, bytes: Vec<u8>) -> NativeObject {
        self.alloc(NativeValue::Scalar { kind, bytes })
    }

    pub fn text(&self, text: impl Into<String>) -> NativeObject {
        self.alloc(NativeValue::Text(text.into()))
    }

    pub fn none(&self) -> NativeObject {
        self.alloc(NativeValue::None)
    }
}

pub type NativeFunction =
    Arc<dyn Fn(&NativeHeap, Vec<NativeObject>) -> Result<NativeObject, String> + Send + Sync>;

enum NativeSymbol {
    Function(NativeFunction),
    Constant(f64),
}

/// A named collection of symbols importable from a [`NativeRuntime`].
pub struct NativeModule {
    name: String,
    symbols: HashMap<String, NativeSymbol>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&NativeHeap, Vec<NativeObject>) -> Result<NativeObject, String>
            + Send
            + Sync
            + 'static,
    {
        self.symbols
            .insert(name.into(), NativeSymbol::Function(Arc::new(function)));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.symbols.insert(name.into(), NativeSymbol::Constant(value));
        self
    }
}

/// Embedded runtime backed by registered Rust functions.
pub struct NativeRuntime {
    modules: HashMap<String, NativeModule>,
    heap: NativeHeap,
    initialized: bool,
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRuntime {
    /// A runtime with no importable modules.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            heap: NativeHeap::default(),
            initialized: false,
        }
    }

    /// A runtime preloaded with [`standard_library`].
    pub fn with_standard_library() -> Self {
        standard_library()
            .into_iter()
            .fold(Self::new(), |runtime, module| runtime.module(module))
    }

    pub fn module(mut self, module: NativeModule) -> Self {
        self.modules.insert(module.name.clone(), module);
        self
    }

    pub fn heap(&self) -> &NativeHeap {
        &self.heap
    }

    pub fn stats(&self) -> Arc<NativeStats> {
        Arc::clone(&self.heap.stats)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "native function panicked".into())
}

impl ForeignRuntime for NativeRuntime {
    type Object = NativeObject;
    type Callable = NativeFunction;

    fn name(&self) -> &'static str {
        "native"
    }

    fn initialize(&mut self, config: &RuntimeConfig) -> Result<(), RuntimeError> {
        if self.initialized {
            return Err(RuntimeError::Resource(
                "native runtime is already initialized".into(),
            ));
        }
        self.initialized = true;
        self.heap.stats.initializations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            modules = self.modules.len(),
            search_paths = ?config.search_paths,
            "Native runtime ready"
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), RuntimeError> {
        if !self.initialized {
            return Err(RuntimeError::Resource(
                "native runtime was never initialized".into(),
            ));
        }
        self.initialized = false;
        self.heap.stats.finalizations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn new_array(
        &self,
        kind: ElementKind,
        shape: &[usize],
        bytes: &[u8],
    ) -> Result<NativeObject, RuntimeError> {
        Ok(self
            .heap
            .array_from_bytes(kind, shape.to_vec(), kind.copy(bytes)))
    }

    fn new_scalar(&self, kind: ElementKind, bytes: &[u8]) -> Result<NativeObject, RuntimeError> {
        Ok(self.heap.scalar(kind, kind.copy(bytes)))
    }

    fn is_array(&self, object: &NativeObject) -> bool {
        object.as_array().is_some()
    }

    fn take_array(
        &self,
        object: NativeObject,
        kind: ElementKind,
    ) -> Result<DecodedArray, RuntimeError> {
        match object.as_array() {
            Some(array) if array.kind == kind => {
                let expected = element_count(&array.shape)?
                    .checked_mul(kind.size())
                    .ok_or_else(|| TensorError::Overflow(array.shape.clone()))?;
                // A ragged buffer would otherwise be truncated by the copy.
                if array.data.len() != expected {
                    return Err(TensorError::BufferSize {
                        dtype: kind.host(),
                        shape: array.shape.clone(),
                        expected,
                        actual: array.data.len(),
                    }
                    .into());
                }
                Ok(DecodedArray {
                    shape: array.shape.clone(),
                    bytes: kind.copy(&array.data),
                })
            }
            Some(array) => Err(RuntimeError::UnsupportedType(format!(
                "foreign array holds {}, expected {kind}",
                array.kind
            ))),
            None => Err(RuntimeError::UnsupportedType(format!(
                "{} is not an array of {kind}",
                self.describe(&object)
            ))),
        }
    }

    fn describe(&self, object: &NativeObject) -> String {
        match &object.value {
            NativeValue::Array(array) => format!("{} array of shape {:?}", array.kind, array.shape),
            NativeValue::Scalar { kind, .. } => format!("{kind} scalar"),
            NativeValue::Text(_) => "str".into(),
            NativeValue::None => "None".into(),
        }
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<NativeFunction, BindError> {
        let found = self
            .modules
            .get(module)
            .ok_or_else(|| BindError::ModuleNotFound {
                module: module.into(),
                reason: "no native module with that name".into(),
            })?;
        match found.symbols.get(symbol) {
            Some(NativeSymbol::Function(function)) => Ok(Arc::clone(function)),
            Some(NativeSymbol::Constant(_)) => Err(BindError::NotCallable {
                module: module.into(),
                symbol: symbol.into(),
            }),
            None => Err(BindError::MissingSymbol {
                module: module.into(),
                symbol: symbol.into(),
            }),
        }
    }

    fn call(
        &self,
        callable: &NativeFunction,
        args: Vec<NativeObject>,
    ) -> Result<NativeObject, RuntimeError> {
        self.heap.stats.calls.fetch_add(1, Ordering::SeqCst);
        match std::panic::catch_unwind(AssertUnwindSafe(|| callable(&self.heap, args))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(RuntimeError::Invocation(message)),
            Err(payload) => Err(RuntimeError::Invocation(panic_message(payload.as_ref()))),
        }
    }
}

fn arrays<'a>(
    function: &str,
    args: &'a [NativeObject],
    arity: usize,
) -> Result<Vec<&'a NativeArray>, String> {
    if args.len() != arity {
        return Err(format!(
            "TypeError: {function}() takes {arity} positional argument(s) but {} were given",
            args.len()
        ));
    }
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            arg.as_array()
                .ok_or_else(|| format!("TypeError: {function}() argument {i} is not an array"))
        })
        .collect()
}

fn add_one(heap: &NativeHeap, args: Vec<NativeObject>) -> Result<NativeObject, String> {
    let x = arrays("add_one", &args, 1)?[0];
    with_element_type!(x.kind(), T => {
        let values: Vec<T> = x.values().ok_or("element kind mismatch")?;
        heap.array_from_values(x.shape().to_vec(), values.into_iter().map(|v| v + (1 as T)).collect())
    })
}

fn negate(heap: &NativeHeap, args: Vec<NativeObject>) -> Result<NativeObject, String> {
    let x = arrays("negate", &args, 1)?[0];
    with_element_type!(x.kind(), T => {
        let values: Vec<T> = x.values().ok_or("element kind mismatch")?;
        heap.array_from_values(x.shape().to_vec(), values.into_iter().map(|v| -v).collect())
    })
}

fn add(heap: &NativeHeap, args: Vec<NativeObject>) -> Result<NativeObject, String> {
    let operands = arrays("add", &args, 2)?;
    let (a, b) = (operands[0], operands[1]);
    if a.kind() != b.kind() || a.shape() != b.shape() {
        return Err(format!(
            "ValueError: operands differ ({} {:?} vs {} {:?})",
            a.kind(),
            a.shape(),
            b.kind(),
            b.shape()
        ));
    }
    with_element_type!(a.kind(), T => {
        let lhs: Vec<T> = a.values().ok_or("element kind mismatch")?;
        let rhs: Vec<T> = b.values().ok_or("element kind mismatch")?;
        heap.array_from_values(a.shape().to_vec(), lhs.into_iter().zip(rhs).map(|(l, r)| l + r).collect())
    })
}

/// Modules every native runtime can be preloaded with.
///
/// `math_ops` exposes `add_one`, `negate` and `add` (element-wise, shape and
/// element kind preserving) and the non-callable constant `pi`.
pub fn standard_library() -> Vec<NativeModule> {
    vec![
        NativeModule::new("math_ops")
            .function("add_one", add_one)
            .function("negate", negate)
            .function("add", add)
            .constant("pi", std::f64::consts::PI),
    ]
}
