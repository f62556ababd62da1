//! Host-side contract for the PyOp bridge.
//!
//! Everything in this crate describes what the execution engine expects from
//! a kernel plugin: the tensor representation it hands to kernels, the
//! descriptors it reads to discover kernels and schemas, and the traits it
//! calls to construct and run them. The bridge itself lives in
//! `pyop-runtime` and `pyop-plugin`.

pub mod descriptor;
pub mod error;
pub mod host;
pub mod tensor;

pub use descriptor::{
    CPU_EXECUTION_PROVIDER, FormalParameter, KernelCreateFn, KernelCreateInfo, KernelDef,
    KernelDefBuilder, KernelsContainer, ONNX_DOMAIN, OpSchema, SchemasContainer,
};
pub use error::TensorError;
pub use host::{
    AttributeValue, ComputeContext, KernelContext, KernelInfo, NodeAttributes, OpKernel, Status,
    StatusCode,
};
pub use tensor::{DataType, Scalar, Tensor, TensorElement, Value};
