use pyop_core::tensor::encode_values;
use pyop_core::{DataType, Scalar, Tensor, Value};

use crate::dtype::ElementKind;
use crate::error::RuntimeError;
use crate::foreign::ForeignRuntime;

/// Deep-copy conversion between host values and foreign objects.
///
/// Borrowed from inside [`RuntimeHandle::enter`](crate::RuntimeHandle::enter);
/// it never outlives one critical section.
pub struct Marshaler<'rt, R: ForeignRuntime> {
    runtime: &'rt R,
}

impl<'rt, R: ForeignRuntime> Marshaler<'rt, R> {
    pub fn new(runtime: &'rt R) -> Self {
        Self { runtime }
    }

    /// Copies `tensor` into a freshly allocated foreign array.
    pub fn to_foreign(&self, tensor: &Tensor) -> Result<R::Object, RuntimeError> {
        let kind = ElementKind::for_host(tensor.dtype())?;
        tracing::trace!(dtype = %kind, shape = ?tensor.shape(), "Marshaling tensor");
        self.runtime.new_array(kind, tensor.shape(), tensor.data())
    }

    pub fn scalar_to_foreign(&self, scalar: &Scalar) -> Result<R::Object, RuntimeError> {
        let kind = ElementKind::for_host(scalar.dtype())?;
        let bytes = match *scalar {
            Scalar::Int32(v) => encode_values(&[v]),
            Scalar::Int64(v) => encode_values(&[v]),
            Scalar::Float32(v) => encode_values(&[v]),
            Scalar::Float64(v) => encode_values(&[v]),
            Scalar::Bool(v) => encode_values(&[v]),
        };
        self.runtime.new_scalar(kind, &bytes)
    }

    pub fn value_to_foreign(&self, value: &Value) -> Result<R::Object, RuntimeError> {
        match value {
            Value::Tensor(tensor) => self.to_foreign(tensor),
            Value::Scalar(scalar) => self.scalar_to_foreign(scalar),
        }
    }

    /// Copies a foreign array back into a host tensor of type `expected`,
    /// consuming the array.
    pub fn from_foreign(
        &self,
        object: R::Object,
        expected: DataType,
    ) -> Result<Tensor, RuntimeError> {
        let kind = ElementKind::for_host(expected)?;
        let decoded = self.runtime.take_array(object, kind)?;
        tracing::trace!(dtype = %kind, shape = ?decoded.shape, "Decoded foreign array");
        Ok(Tensor::from_bytes(expected, decoded.shape, decoded.bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeHeap, NativeObject, NativeRuntime};
    use crate::RuntimeConfig;

    fn runtime() -> NativeRuntime {
        let mut runtime = NativeRuntime::new();
        runtime.initialize(&RuntimeConfig::default()).unwrap();
        runtime
    }

    #[test]
    fn round_trips_every_supported_type() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let tensors = [
            Tensor::from_values(vec![2, 3], vec![1i32, -2, 3, i32::MIN, i32::MAX, 0]).unwrap(),
            Tensor::from_values(vec![3], vec![i64::MIN, 0, i64::MAX]).unwrap(),
            Tensor::from_values(vec![1, 2, 2], vec![0.5f32, -0.0, f32::INFINITY, 1e-30]).unwrap(),
            Tensor::from_values(vec![], vec![std::f64::consts::PI]).unwrap(),
            Tensor::zeros(DataType::Float64, vec![0, 3]).unwrap(),
        ];
        for tensor in tensors {
            let object = m.to_foreign(&tensor).unwrap();
            let back = m.from_foreign(object, tensor.dtype()).unwrap();
            assert_eq!(back.shape(), tensor.shape());
            assert_eq!(back.data(), tensor.data());
        }
        assert_eq!(rt.stats().live_objects(), 0);
    }

    #[test]
    fn nan_payload_survives_byte_copy() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let nan = f32::from_bits(0x7fc0_1234);
        let tensor = Tensor::from_values(vec![1], vec![nan]).unwrap();
        let back = m.from_foreign(m.to_foreign(&tensor).unwrap(), DataType::Float32).unwrap();
        assert_eq!(back.data(), tensor.data());
    }

    #[test]
    fn unsupported_input_allocates_nothing() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let tensor = Tensor::from_values(vec![2], vec![true, false]).unwrap();
        let err = m.to_foreign(&tensor).unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedType(_)));
        assert_eq!(rt.stats().allocations(), 0);
        assert_eq!(rt.stats().live_objects(), 0);
    }

    #[test]
    fn foreign_copy_is_independent_of_host_buffer() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let tensor = Tensor::from_values(vec![2], vec![10i64, 20]).unwrap();
        let object = m.to_foreign(&tensor).unwrap();
        let host_ptr = tensor.data().as_ptr();
        drop(tensor);
        let array = object.as_array().unwrap();
        assert_ne!(array.bytes().as_ptr(), host_ptr);
        assert_eq!(array.values::<i64>(), Some(vec![10, 20]));
    }

    #[test]
    fn decode_rejects_wrong_element_kind_and_releases_it() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let tensor = Tensor::from_values(vec![2], vec![1.0f64, 2.0]).unwrap();
        let object = m.to_foreign(&tensor).unwrap();
        assert_eq!(rt.stats().live_objects(), 1);
        let err = m.from_foreign(object, DataType::Int32).unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedType(_)));
        assert_eq!(rt.stats().live_objects(), 0);
    }

    #[test]
    fn decode_rejects_unsupported_expected_type() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let object = m
            .to_foreign(&Tensor::from_values(vec![1], vec![1i32]).unwrap())
            .unwrap();
        let err = m.from_foreign(object, DataType::Uint8).unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedType(_)));
    }

    #[test]
    fn decode_rejects_non_array() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let text: NativeObject = rt.heap().text("not an array");
        let err = m.from_foreign(text, DataType::Int32).unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedType(_)));
    }

    #[test]
    fn decode_reports_inconsistent_buffer() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let heap: &NativeHeap = rt.heap();
        let bogus = heap.array_from_bytes(ElementKind::Int32, vec![3], vec![0; 8]);
        let err = m.from_foreign(bogus, DataType::Int32).unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch(_)));
    }

    #[test]
    fn decode_rejects_overlong_and_ragged_buffers() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let heap: &NativeHeap = rt.heap();
        for len in [10, 9, 12] {
            let bogus = heap.array_from_bytes(ElementKind::Int32, vec![2], vec![0; len]);
            let err = m.from_foreign(bogus, DataType::Int32).unwrap_err();
            assert!(
                matches!(
                    err,
                    RuntimeError::ShapeMismatch(pyop_core::TensorError::BufferSize {
                        expected: 8,
                        actual,
                        ..
                    }) if actual == len
                ),
                "{len} bytes: {err}"
            );
        }
    }

    #[test]
    fn scalars_marshal_to_runtime_scalars() {
        let rt = runtime();
        let m = Marshaler::new(&rt);
        let object = m.scalar_to_foreign(&Scalar::Int64(42)).unwrap();
        assert!(!rt.is_array(&object));
        assert_eq!(rt.describe(&object), "int64 scalar");
        assert!(matches!(
            m.scalar_to_foreign(&Scalar::Bool(true)),
            Err(RuntimeError::UnsupportedType(_))
        ));
        let value = Value::from(Tensor::from_values(vec![1], vec![1.0f32]).unwrap());
        assert!(rt.is_array(&m.value_to_foreign(&value).unwrap()));
    }
}
