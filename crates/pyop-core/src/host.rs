//! Contract between a kernel and the execution engine that drives it.
//!
//! The engine owns the graph, the attribute storage and the tensor
//! allocator. Kernels only see these traits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Coarse failure class reported through [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Fail,
    InvalidArgument,
    NotImplemented,
    RuntimeException,
    EngineError,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Fail => write!(f, "FAIL"),
            StatusCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            StatusCode::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            StatusCode::RuntimeException => write!(f, "RUNTIME_EXCEPTION"),
            StatusCode::EngineError => write!(f, "ENGINE_ERROR"),
        }
    }
}

/// Per-call error channel between kernels and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

/// Node-level information available while a kernel is constructed.
pub trait KernelInfo {
    fn node_name(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&AttributeValue>;

    fn attribute_string(&self, name: &str) -> Option<&str> {
        match self.attribute(name)? {
            AttributeValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Attribute storage for a single graph node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub node_name: String,
    pub attributes: HashMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_string(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, AttributeValue::String(value.into()))
    }
}

impl KernelInfo for NodeAttributes {
    fn node_name(&self) -> &str {
        &self.node_name
    }

    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Per-invocation view of a node's inputs and outputs.
pub trait KernelContext {
    fn input_count(&self) -> usize;

    fn input(&self, index: usize) -> Option<&Tensor>;

    fn output_count(&self) -> usize;

    /// Hands a fully built tensor to output slot `index`.
    fn set_output(&mut self, index: usize, tensor: Tensor) -> Result<(), Status>;
}

/// In-memory [`KernelContext`] for engines that keep values in plain vectors.
#[derive(Debug, Clone, Default)]
pub struct ComputeContext {
    inputs: Vec<Tensor>,
    outputs: Vec<Option<Tensor>>,
}

impl ComputeContext {
    pub fn new(inputs: Vec<Tensor>, output_count: usize) -> Self {
        Self {
            inputs,
            outputs: vec![None; output_count],
        }
    }

    pub fn output(&self, index: usize) -> Option<&Tensor> {
        self.outputs.get(index).and_then(Option::as_ref)
    }

    pub fn take_output(&mut self, index: usize) -> Option<Tensor> {
        self.outputs.get_mut(index).and_then(Option::take)
    }
}

impl KernelContext for ComputeContext {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn input(&self, index: usize) -> Option<&Tensor> {
        self.inputs.get(index)
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn set_output(&mut self, index: usize, tensor: Tensor) -> Result<(), Status> {
        let slot = self.outputs.get_mut(index).ok_or_else(|| {
            Status::new(
                StatusCode::InvalidArgument,
                format!("output index {index} out of range"),
            )
        })?;
        *slot = Some(tensor);
        Ok(())
    }
}

/// An executable unit implementing one operator for one execution provider.
pub trait OpKernel: Send + Sync {
    fn compute(&self, ctx: &mut dyn KernelContext) -> Result<(), Status>;
}
