use pyop_core::tensor::{decode_values, encode_values};
use pyop_core::{DataType, TensorElement};

use crate::error::RuntimeError;

/// Element kinds that cross the host/foreign boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Int32,
    Int64,
    Float32,
    Float64,
}

/// One row of the marshaling dispatch table.
pub struct ElementSpec {
    pub kind: ElementKind,
    pub host: DataType,
    pub size: usize,
    /// Array-interface type string understood by the foreign array extension.
    pub type_code: &'static str,
    /// Element-wise deep copy of a native-order buffer.
    pub copy: fn(&[u8]) -> Vec<u8>,
}

fn copy_elements<T: TensorElement>(bytes: &[u8]) -> Vec<u8> {
    encode_values(&decode_values::<T>(bytes))
}

pub static ELEMENT_TABLE: [ElementSpec; 4] = [
    ElementSpec {
        kind: ElementKind::Int32,
        host: DataType::Int32,
        size: 4,
        type_code: "i4",
        copy: copy_elements::<i32>,
    },
    ElementSpec {
        kind: ElementKind::Int64,
        host: DataType::Int64,
        size: 8,
        type_code: "i8",
        copy: copy_elements::<i64>,
    },
    ElementSpec {
        kind: ElementKind::Float32,
        host: DataType::Float32,
        size: 4,
        type_code: "f4",
        copy: copy_elements::<f32>,
    },
    ElementSpec {
        kind: ElementKind::Float64,
        host: DataType::Float64,
        size: 8,
        type_code: "f8",
        copy: copy_elements::<f64>,
    },
];

impl ElementKind {
    /// Looks up the kind for a host type, failing for anything outside the table.
    pub fn for_host(dtype: DataType) -> Result<Self, RuntimeError> {
        ELEMENT_TABLE
            .iter()
            .find(|spec| spec.host == dtype)
            .map(|spec| spec.kind)
            .ok_or_else(|| {
                RuntimeError::UnsupportedType(format!("{dtype} cannot be marshaled"))
            })
    }

    pub fn from_type_code(code: &str) -> Option<Self> {
        ELEMENT_TABLE
            .iter()
            .find(|spec| spec.type_code == code)
            .map(|spec| spec.kind)
    }

    pub fn spec(self) -> &'static ElementSpec {
        match self {
            ElementKind::Int32 => &ELEMENT_TABLE[0],
            ElementKind::Int64 => &ELEMENT_TABLE[1],
            ElementKind::Float32 => &ELEMENT_TABLE[2],
            ElementKind::Float64 => &ELEMENT_TABLE[3],
        }
    }

    pub fn host(self) -> DataType {
        self.spec().host
    }

    pub fn size(self) -> usize {
        self.spec().size
    }

    pub fn copy(self, bytes: &[u8]) -> Vec<u8> {
        (self.spec().copy)(bytes)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.host().name())
    }
}

/// Expands `$body` once per element kind with `$T` bound to the Rust type.
#[macro_export]
macro_rules! with_element_type {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            $crate::ElementKind::Int32 => {
                type $T = i32;
                $body
            }
            $crate::ElementKind::Int64 => {
                type $T = i64;
                $body
            }
            $crate::ElementKind::Float32 => {
                type $T = f32;
                $body
            }
            $crate::ElementKind::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
