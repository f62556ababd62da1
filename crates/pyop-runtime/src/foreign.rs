use crate::config::RuntimeConfig;
use crate::dtype::ElementKind;
use crate::error::{BindError, RuntimeError};

/// Shape and element bytes copied out of a foreign array.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArray {
    pub shape: Vec<usize>,
    pub bytes: Vec<u8>,
}

/// An embedded interpreter together with its numeric-array extension.
///
/// Implementations are driven exclusively through
/// [`RuntimeLifecycle`](crate::RuntimeLifecycle), which serializes every
/// call behind one lock, so none of these methods need their own
/// synchronization. Objects handed out by a runtime own their storage in the
/// runtime's allocator and are released by dropping them.
pub trait ForeignRuntime: Send + 'static {
    /// A value owned by the foreign runtime (array, scalar, or anything else).
    type Object: Send;
    /// A resolved, invocable foreign symbol.
    type Callable: Send + Sync;

    fn name(&self) -> &'static str;

    /// Brings the interpreter and its array extension up. Called at most once.
    fn initialize(&mut self, config: &RuntimeConfig) -> Result<(), RuntimeError>;

    /// Tears the interpreter down. Called at most once, after `initialize`.
    fn finalize(&mut self) -> Result<(), RuntimeError>;

    /// Allocates a fresh array and copies `bytes` (native order) into it.
    fn new_array(
        &self,
        kind: ElementKind,
        shape: &[usize],
        bytes: &[u8],
    ) -> Result<Self::Object, RuntimeError>;

    /// Builds the runtime's own scalar object from one native-order element.
    fn new_scalar(&self, kind: ElementKind, bytes: &[u8]) -> Result<Self::Object, RuntimeError>;

    fn is_array(&self, object: &Self::Object) -> bool;

    /// Consumes `object` and copies its contents out, provided it is an array
    /// whose elements are of `kind`.
    fn take_array(
        &self,
        object: Self::Object,
        kind: ElementKind,
    ) -> Result<DecodedArray, RuntimeError>;

    /// Short human-readable description of an object's type, for errors.
    fn describe(&self, object: &Self::Object) -> String;

    fn resolve(&self, module: &str, symbol: &str) -> Result<Self::Callable, BindError>;

    /// Calls `callable` with `args` as positional arguments. The arguments
    /// are consumed by the call.
    fn call(
        &self,
        callable: &Self::Callable,
        args: Vec<Self::Object>,
    ) -> Result<Self::Object, RuntimeError>;

    fn release_callable(&self, callable: Self::Callable) {
        drop(callable);
    }
}
