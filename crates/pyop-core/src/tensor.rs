use serde::{Deserialize, Serialize};

use crate::error::TensorError;

/// Element type of a host tensor.
///
/// Discriminants follow the ONNX `TensorProto.DataType` numbering. Parsing
/// accepts either a type name or the raw ONNX tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32 = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    Bool = 9,
    Float16 = 10,
    Float64 = 11,
    Uint32 = 12,
    Uint64 = 13,
}

impl DataType {
    /// Size in bytes of one element.
    pub const fn element_size(self) -> usize {
        match self {
            DataType::Bool | DataType::Int8 | DataType::Uint8 => 1,
            DataType::Int16 | DataType::Uint16 | DataType::Float16 => 2,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Uint64 | DataType::Float64 => 8,
        }
    }

    pub fn from_onnx(tag: i32) -> Option<Self> {
        Some(match tag {
            1 => DataType::Float32,
            2 => DataType::Uint8,
            3 => DataType::Int8,
            4 => DataType::Uint16,
            5 => DataType::Int16,
            6 => DataType::Int32,
            7 => DataType::Int64,
            9 => DataType::Bool,
            10 => DataType::Float16,
            11 => DataType::Float64,
            12 => DataType::Uint32,
            13 => DataType::Uint64,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Uint8 => "uint8",
            DataType::Int8 => "int8",
            DataType::Uint16 => "uint16",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Bool => "bool",
            DataType::Float16 => "float16",
            DataType::Float64 => "float64",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "float32" | "float" => DataType::Float32,
            "uint8" => DataType::Uint8,
            "int8" => DataType::Int8,
            "uint16" => DataType::Uint16,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "bool" => DataType::Bool,
            "float16" => DataType::Float16,
            "float64" | "double" => DataType::Float64,
            "uint32" => DataType::Uint32,
            "uint64" => DataType::Uint64,
            other => {
                return other
                    .parse::<i32>()
                    .ok()
                    .and_then(DataType::from_onnx)
                    .ok_or_else(|| format!("unknown data type '{other}'"));
            }
        })
    }
}

/// A Rust value type that can live in a tensor buffer.
///
/// Values are stored in native byte order.
pub trait TensorElement: Copy + Send + Sync + 'static {
    const DTYPE: DataType;

    fn write_to(self, out: &mut Vec<u8>);

    /// Reads one element from exactly `DTYPE.element_size()` bytes.
    fn read_from(bytes: &[u8]) -> Self;
}

macro_rules! numeric_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl TensorElement for $ty {
                const DTYPE: DataType = DataType::$dtype;

                fn write_to(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn read_from(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

numeric_element! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

impl TensorElement for bool {
    const DTYPE: DataType = DataType::Bool;

    fn write_to(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_from(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Number of elements described by `shape`. A rank-0 shape holds one element.
pub fn element_count(shape: &[usize]) -> Result<usize, TensorError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| TensorError::Overflow(shape.to_vec()))
}

/// Decodes a native-endian byte buffer into typed values.
///
/// The caller guarantees `bytes.len()` is a multiple of `T`'s element size.
pub fn decode_values<T: TensorElement>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.element_size())
        .map(T::read_from)
        .collect()
}

pub fn encode_values<T: TensorElement>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DTYPE.element_size());
    for value in values {
        value.write_to(&mut out);
    }
    out
}

/// Host-owned typed multi-dimensional buffer.
///
/// The buffer length always equals the element count of `shape` times the
/// element size of `dtype`; every constructor enforces this.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DataType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    pub fn from_bytes(
        dtype: DataType,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> Result<Self, TensorError> {
        let expected = element_count(&shape)?
            .checked_mul(dtype.element_size())
            .ok_or_else(|| TensorError::Overflow(shape.clone()))?;
        if data.len() != expected {
            return Err(TensorError::BufferSize {
                dtype,
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_values<T: TensorElement>(
        shape: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, TensorError> {
        let expected = element_count(&shape)?;
        if values.len() != expected {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            dtype: T::DTYPE,
            data: encode_values(&values),
            shape,
        })
    }

    pub fn zeros(dtype: DataType, shape: Vec<usize>) -> Result<Self, TensorError> {
        let len = element_count(&shape)?
            .checked_mul(dtype.element_size())
            .ok_or_else(|| TensorError::Overflow(shape.clone()))?;
        Ok(Self {
            dtype,
            shape,
            data: vec![0; len],
        })
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw element bytes in native byte order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_parts(self) -> (DataType, Vec<usize>, Vec<u8>) {
        (self.dtype, self.shape, self.data)
    }

    /// Copies the elements out as `T`, failing if `T` is not the tensor's type.
    pub fn to_values<T: TensorElement>(&self) -> Result<Vec<T>, TensorError> {
        if T::DTYPE != self.dtype {
            return Err(TensorError::TypeMismatch {
                actual: self.dtype,
                requested: T::DTYPE,
            });
        }
        Ok(decode_values(&self.data))
    }
}

/// A non-tensor host value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
}

impl Scalar {
    pub fn dtype(&self) -> DataType {
        match self {
            Scalar::Int32(_) => DataType::Int32,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::Float32(_) => DataType::Float32,
            Scalar::Float64(_) => DataType::Float64,
            Scalar::Bool(_) => DataType::Bool,
        }
    }
}

/// A value flowing along a graph edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    Scalar(Scalar),
}

impl Value {
    pub fn dtype(&self) -> DataType {
        match self {
            Value::Tensor(tensor) => tensor.dtype(),
            Value::Scalar(scalar) => scalar.dtype(),
        }
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::Tensor(tensor)
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_values_encodes_native_bytes() {
        let t = Tensor::from_values(vec![2, 2], vec![1i32, 2, 3, 4]).unwrap();
        assert_eq!(t.dtype(), DataType::Int32);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data().len(), 16);
        assert_eq!(&t.data()[4..8], &2i32.to_ne_bytes());
        assert_eq!(t.to_values::<i32>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        let err = Tensor::from_bytes(DataType::Float64, vec![3], vec![0; 16]).unwrap_err();
        assert_eq!(
            err,
            TensorError::BufferSize {
                dtype: DataType::Float64,
                shape: vec![3],
                expected: 24,
                actual: 16,
            }
        );
    }

    #[test]
    fn from_values_rejects_wrong_count() {
        let err = Tensor::from_values(vec![2, 3], vec![1.0f32; 5]).unwrap_err();
        assert!(matches!(err, TensorError::ElementCount { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn rank_zero_holds_one_element() {
        let t = Tensor::from_values(vec![], vec![7i64]).unwrap();
        assert_eq!(t.rank(), 0);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn zero_sized_dimension_is_empty() {
        let t = Tensor::zeros(DataType::Int32, vec![0, 4]).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn to_values_checks_type() {
        let t = Tensor::from_values(vec![1], vec![1.5f64]).unwrap();
        assert!(matches!(
            t.to_values::<f32>(),
            Err(TensorError::TypeMismatch {
                actual: DataType::Float64,
                requested: DataType::Float32,
            })
        ));
    }

    #[test]
    fn parses_onnx_tags() {
        assert_eq!("6".parse::<DataType>().unwrap(), DataType::Int32);
        assert_eq!("11".parse::<DataType>().unwrap(), DataType::Float64);
        for tag in 0..16 {
            if let Ok(dtype) = tag.to_string().parse::<DataType>() {
                assert_eq!(dtype as i32, tag);
            }
        }
        assert!("8".parse::<DataType>().is_err(), "string tensors are not supported");
    }

    #[test]
    fn parses_type_names() {
        assert_eq!("int32".parse::<DataType>().unwrap(), DataType::Int32);
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Float64);
        assert!("complex64".parse::<DataType>().is_err());
    }
}
