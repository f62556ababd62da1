use std::sync::Arc;

use pyop_core::{DataType, Tensor, Value};
use pyop_runtime::{ForeignRuntime, FunctionBinding, Marshaler, RuntimeError, RuntimeLifecycle};

use crate::error::KernelError;

/// Binds `module.function`, calls it once with `inputs` and decodes the
/// result as `output`.
///
/// Unlike a kernel, nothing is kept: the function reference is released and
/// the ownership given back before returning.
pub fn invoke_once<R: ForeignRuntime>(
    lifecycle: &Arc<RuntimeLifecycle<R>>,
    module: &str,
    function: &str,
    inputs: &[Value],
    output: DataType,
) -> Result<Tensor, KernelError> {
    let handle = lifecycle.acquire()?;
    let tensor = handle.enter(|rt| {
        let binding = FunctionBinding::bind(rt, module, function)?;
        let result = call(rt, &binding, inputs, output);
        rt.release_callable(binding.into_callable());
        result
    })?;
    Ok(tensor)
}

fn call<R: ForeignRuntime>(
    rt: &R,
    binding: &FunctionBinding<R>,
    inputs: &[Value],
    output: DataType,
) -> Result<Tensor, RuntimeError> {
    let marshaler = Marshaler::new(rt);
    let args = inputs
        .iter()
        .map(|value| marshaler.value_to_foreign(value))
        .collect::<Result<Vec<_>, _>>()?;
    let result = binding.invoke(rt, args)?;
    marshaler.from_foreign(result, output)
}
