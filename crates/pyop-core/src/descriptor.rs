use serde::{Deserialize, Serialize};

use crate::host::{KernelInfo, OpKernel, Status};
use crate::tensor::DataType;

/// The default ONNX operator domain.
pub const ONNX_DOMAIN: &str = "";

pub const CPU_EXECUTION_PROVIDER: &str = "CPUExecutionProvider";

/// Static description of a kernel, consumed by the host's kernel dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelDef {
    pub name: String,
    pub domain: String,
    /// Lowest opset version this kernel implements.
    pub since_version: i32,
    /// Highest opset version, if the kernel is not open-ended.
    pub end_version: Option<i32>,
    pub provider: String,
}

impl KernelDef {
    pub fn supports(&self, opset: i32) -> bool {
        opset >= self.since_version && self.end_version.is_none_or(|end| opset <= end)
    }
}

#[derive(Debug, Default)]
pub struct KernelDefBuilder {
    name: String,
    domain: String,
    since_version: i32,
    end_version: Option<i32>,
    provider: String,
}

impl KernelDefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn since_version(mut self, version: i32) -> Self {
        self.since_version = version;
        self
    }

    pub fn version_range(mut self, since: i32, end: i32) -> Self {
        self.since_version = since;
        self.end_version = Some(end);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn build(self) -> KernelDef {
        KernelDef {
            name: self.name,
            domain: self.domain,
            since_version: self.since_version,
            end_version: self.end_version,
            provider: self.provider,
        }
    }
}

/// Factory the host calls to instantiate a kernel for one graph node.
pub type KernelCreateFn =
    Box<dyn Fn(&dyn KernelInfo) -> Result<Box<dyn OpKernel>, Status> + Send + Sync>;

pub struct KernelCreateInfo {
    pub def: KernelDef,
    pub create: KernelCreateFn,
}

impl std::fmt::Debug for KernelCreateInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCreateInfo")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// A formal input or output of an operator schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormalParameter {
    pub name: String,
    /// Fixed element type, or `None` when any type is accepted.
    pub dtype: Option<DataType>,
    pub variadic: bool,
}

/// Operator metadata consumed by the host's operator-set validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSchema {
    pub name: String,
    pub domain: String,
    pub since_version: i32,
    pub doc: String,
    pub inputs: Vec<FormalParameter>,
    pub outputs: Vec<FormalParameter>,
    /// Names of the string attributes a node must carry.
    pub required_attributes: Vec<String>,
}

impl OpSchema {
    /// Declared element type of output `index`, if the schema fixes one.
    pub fn output_type(&self, index: usize) -> Option<DataType> {
        self.outputs.get(index).and_then(|p| p.dtype)
    }
}

/// Heap-owned list of kernels handed to the host loader.
#[derive(Debug, Default)]
pub struct KernelsContainer {
    pub kernels: Vec<KernelCreateInfo>,
}

/// Heap-owned list of schemas handed to the host loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemasContainer {
    pub domain: String,
    pub baseline_opset_version: i32,
    pub opset_version: i32,
    pub schemas: Vec<OpSchema>,
}
