use std::sync::Arc;

use pyop_core::{DataType, KernelContext, KernelInfo, OpKernel, Status, Tensor};
use pyop_runtime::{
    ForeignRuntime, FunctionBinding, Marshaler, RuntimeError, RuntimeHandle, RuntimeLifecycle,
};

use crate::error::KernelError;

/// Node attribute naming the module to import.
pub const MODULE_ATTR: &str = "module";
/// Node attribute naming the function inside the module.
pub const FUNCTION_ATTR: &str = "function";
/// Element type every PyOp output is decoded as.
pub const OUTPUT_TYPE: DataType = DataType::Int32;

fn required_attribute(info: &dyn KernelInfo, name: &'static str) -> Result<String, KernelError> {
    info.attribute_string(name)
        .map(str::to_string)
        .ok_or(KernelError::MissingAttribute(name))
}

/// A graph node whose computation is a function in the embedded runtime.
///
/// Construction registers the kernel as an owner of the runtime and binds the
/// function once. Each compute copies every input into the runtime, calls the
/// function with the inputs in order, and copies the returned array back as
/// output 0. The whole round trip runs inside one critical section.
pub struct PyOpKernel<R: ForeignRuntime> {
    // Only `None` while dropping.
    binding: Option<FunctionBinding<R>>,
    output_type: DataType,
    handle: RuntimeHandle<R>,
}

impl<R: ForeignRuntime> PyOpKernel<R> {
    pub fn new(
        info: &dyn KernelInfo,
        lifecycle: &Arc<RuntimeLifecycle<R>>,
    ) -> Result<Self, KernelError> {
        let module = required_attribute(info, MODULE_ATTR)?;
        let function = required_attribute(info, FUNCTION_ATTR)?;

        // A failed bind drops the handle, which gives the ownership back.
        let handle = lifecycle.acquire()?;
        let binding = handle.enter(|rt| Ok(FunctionBinding::bind(rt, &module, &function)?))?;

        tracing::info!(
            node = info.node_name(),
            module = %module,
            function = %function,
            "PyOp kernel created"
        );
        Ok(Self {
            binding: Some(binding),
            output_type: OUTPUT_TYPE,
            handle,
        })
    }

    pub fn module(&self) -> &str {
        self.binding.as_ref().map_or("", |b| b.module())
    }

    pub fn function(&self) -> &str {
        self.binding.as_ref().map_or("", |b| b.symbol())
    }

    pub fn output_type(&self) -> DataType {
        self.output_type
    }

    /// Runs the bound function on the context's inputs.
    ///
    /// Output 0 is written only after the whole call has succeeded.
    pub fn try_compute(&self, ctx: &mut dyn KernelContext) -> Result<(), KernelError> {
        let Some(binding) = &self.binding else {
            return Err(RuntimeError::Resource("kernel has released its function".into()).into());
        };
        let inputs = (0..ctx.input_count())
            .map(|i| ctx.input(i).ok_or(KernelError::MissingInput(i)))
            .collect::<Result<Vec<&Tensor>, _>>()?;

        let output = self.handle.enter(|rt| {
            let marshaler = Marshaler::new(rt);
            // Arguments built so far are dropped inside the critical section
            // if a later one fails.
            let args = inputs
                .iter()
                .map(|tensor| marshaler.to_foreign(tensor))
                .collect::<Result<Vec<_>, _>>()?;
            let result = binding.invoke(rt, args)?;
            marshaler.from_foreign(result, self.output_type)
        })?;

        tracing::trace!(
            function = %binding.qualified_name(),
            shape = ?output.shape(),
            "PyOp compute finished"
        );
        ctx.set_output(0, output).map_err(KernelError::Output)
    }
}

impl<R: ForeignRuntime> OpKernel for PyOpKernel<R> {
    fn compute(&self, ctx: &mut dyn KernelContext) -> Result<(), Status> {
        self.try_compute(ctx).map_err(|e| {
            tracing::warn!(
                module = self.module(),
                function = self.function(),
                error = %e,
                "PyOp compute failed"
            );
            Status::from(e)
        })
    }
}

impl<R: ForeignRuntime> Drop for PyOpKernel<R> {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            self.handle.retire_callable(binding.into_callable());
        }
        // `handle` drops next and releases this kernel's ownership.
    }
}

impl<R: ForeignRuntime> std::fmt::Debug for PyOpKernel<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyOpKernel")
            .field("binding", &self.binding)
            .field("output_type", &self.output_type)
            .finish_non_exhaustive()
    }
}
