use crate::error::{BindError, RuntimeError};
use crate::foreign::ForeignRuntime;

/// A foreign function resolved from a `(module, symbol)` pair.
///
/// Binding only resolves the symbol and checks that it is callable; nothing
/// runs until [`invoke`](FunctionBinding::invoke).
pub struct FunctionBinding<R: ForeignRuntime> {
    module: String,
    symbol: String,
    callable: R::Callable,
}

impl<R: ForeignRuntime> FunctionBinding<R> {
    pub fn bind(runtime: &R, module: &str, symbol: &str) -> Result<Self, BindError> {
        let callable = runtime.resolve(module, symbol)?;
        tracing::debug!(runtime = runtime.name(), module, symbol, "Bound foreign function");
        Ok(Self {
            module: module.to_string(),
            symbol: symbol.to_string(),
            callable,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.symbol)
    }

    /// Calls the function with `args` in order. The arguments are consumed.
    ///
    /// Fails with [`RuntimeError::UnsupportedResult`] when the function
    /// returns something other than an array.
    pub fn invoke(&self, runtime: &R, args: Vec<R::Object>) -> Result<R::Object, RuntimeError> {
        tracing::trace!(function = %self.qualified_name(), args = args.len(), "Invoking");
        let result = runtime.call(&self.callable, args)?;
        if !runtime.is_array(&result) {
            return Err(RuntimeError::UnsupportedResult(format!(
                "{} returned {}, expected an array",
                self.qualified_name(),
                runtime.describe(&result)
            )));
        }
        Ok(result)
    }

    /// Gives up the binding, returning the callable so it can be released
    /// inside the runtime's critical section.
    pub fn into_callable(self) -> R::Callable {
        self.callable
    }
}

impl<R: ForeignRuntime> std::fmt::Debug for FunctionBinding<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("module", &self.module)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}
