use std::sync::Arc;

use pyop_core::{
    CPU_EXECUTION_PROVIDER, FormalParameter, KernelCreateFn, KernelCreateInfo, KernelDef,
    KernelDefBuilder, KernelInfo, KernelsContainer, ONNX_DOMAIN, OpKernel, OpSchema,
    SchemasContainer,
};
use pyop_runtime::{ForeignRuntime, RuntimeLifecycle};

use crate::error::KernelError;
use crate::kernel::{FUNCTION_ATTR, MODULE_ATTR, OUTPUT_TYPE, PyOpKernel};

pub const OP_NAME: &str = "PyOp";
pub const KERNEL_SINCE_VERSION: i32 = 7;
pub const SCHEMA_SINCE_VERSION: i32 = 7;
pub const BASELINE_OPSET_VERSION: i32 = 5;
pub const OPSET_VERSION: i32 = 7;

/// Registration record for the PyOp kernel on the CPU provider.
pub fn pyop_kernel_def() -> KernelDef {
    KernelDefBuilder::new()
        .name(OP_NAME)
        .domain(ONNX_DOMAIN)
        .since_version(KERNEL_SINCE_VERSION)
        .provider(CPU_EXECUTION_PROVIDER)
        .build()
}

pub fn pyop_schema() -> OpSchema {
    OpSchema {
        name: OP_NAME.to_string(),
        domain: ONNX_DOMAIN.to_string(),
        since_version: SCHEMA_SINCE_VERSION,
        doc: format!(
            "Calls `{FUNCTION_ATTR}` from `{MODULE_ATTR}` in the embedded runtime with the \
             node's inputs and returns its array result."
        ),
        inputs: vec![FormalParameter {
            name: "inputs".to_string(),
            dtype: None,
            variadic: true,
        }],
        outputs: vec![FormalParameter {
            name: "output".to_string(),
            dtype: Some(OUTPUT_TYPE),
            variadic: false,
        }],
        required_attributes: vec![MODULE_ATTR.to_string(), FUNCTION_ATTR.to_string()],
    }
}

type LifecycleSource<R> =
    Arc<dyn Fn() -> Result<Arc<RuntimeLifecycle<R>>, KernelError> + Send + Sync>;

/// Builds the descriptor containers the host loader asks for.
///
/// Kernel factories resolve the runtime lifecycle lazily, so a broken
/// settings file surfaces when the first node is constructed rather than
/// when the plugin is loaded.
pub struct PluginCatalog<R: ForeignRuntime> {
    source: LifecycleSource<R>,
}

impl<R: ForeignRuntime> Clone for PluginCatalog<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<R: ForeignRuntime> PluginCatalog<R> {
    pub fn new(lifecycle: Arc<RuntimeLifecycle<R>>) -> Self {
        Self::with_source(move || Ok(Arc::clone(&lifecycle)))
    }

    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> Result<Arc<RuntimeLifecycle<R>>, KernelError> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn kernels(&self) -> KernelsContainer {
        let source = Arc::clone(&self.source);
        let create: KernelCreateFn = Box::new(move |info: &dyn KernelInfo| {
            let kernel = source().and_then(|lifecycle| PyOpKernel::new(info, &lifecycle));
            match kernel {
                Ok(kernel) => Ok(Box::new(kernel) as Box<dyn OpKernel>),
                Err(e) => {
                    tracing::error!(node = info.node_name(), error = %e, "Cannot create PyOp kernel");
                    Err(e.into())
                }
            }
        });
        KernelsContainer {
            kernels: vec![KernelCreateInfo {
                def: pyop_kernel_def(),
                create,
            }],
        }
    }

    pub fn schemas(&self) -> SchemasContainer {
        SchemasContainer {
            domain: ONNX_DOMAIN.to_string(),
            baseline_opset_version: BASELINE_OPSET_VERSION,
            opset_version: OPSET_VERSION,
            schemas: vec![pyop_schema()],
        }
    }
}
