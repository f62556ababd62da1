//! JSON and command-line forms of tensors and scalars.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use pyop_core::{DataType, Scalar, Tensor, TensorElement, Value};

/// `{"dtype": "int32", "shape": [2, 2], "data": [1, 2, 3, 4]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct TensorJson {
    pub dtype: DataType,
    pub shape: Vec<usize>,
    pub data: Vec<Json>,
}

fn build<T: TensorElement>(
    json: TensorJson,
    convert: impl Fn(&Json) -> Option<T>,
) -> Result<Tensor> {
    let values = json
        .data
        .iter()
        .enumerate()
        .map(|(i, v)| {
            convert(v).with_context(|| format!("element {i} ({v}) is not a valid {}", json.dtype))
        })
        .collect::<Result<Vec<T>>>()?;
    Ok(Tensor::from_values(json.shape, values)?)
}

impl TensorJson {
    pub fn into_tensor(self) -> Result<Tensor> {
        match self.dtype {
            DataType::Int32 => build(self, |v| v.as_i64().and_then(|n| i32::try_from(n).ok())),
            DataType::Int64 => build(self, Json::as_i64),
            DataType::Float32 => build(self, |v| v.as_f64().map(|f| f as f32)),
            DataType::Float64 => build(self, Json::as_f64),
            DataType::Bool => build(self, Json::as_bool),
            other => bail!("{other} tensors cannot be written as JSON"),
        }
    }

    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let data = match tensor.dtype() {
            DataType::Int32 => serde_json::to_value(tensor.to_values::<i32>()?)?,
            DataType::Int64 => serde_json::to_value(tensor.to_values::<i64>()?)?,
            DataType::Float32 => serde_json::to_value(tensor.to_values::<f32>()?)?,
            DataType::Float64 => serde_json::to_value(tensor.to_values::<f64>()?)?,
            DataType::Bool => serde_json::to_value(tensor.to_values::<bool>()?)?,
            other => bail!("{other} tensors cannot be written as JSON"),
        };
        let Json::Array(data) = data else {
            bail!("tensor values did not serialize to an array");
        };
        Ok(Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data,
        })
    }
}

/// Parses one call argument.
///
/// `<dtype>:<value>` is a scalar (`int64:10`, `float32:0.5`); anything else
/// is a path to a tensor JSON file.
pub fn parse_argument(arg: &str) -> Result<Value> {
    if let Some((dtype, literal)) = arg.split_once(':') {
        if let Ok(dtype) = dtype.parse::<DataType>() {
            return parse_scalar(dtype, literal).map(Value::Scalar);
        }
    }
    let content =
        std::fs::read_to_string(arg).with_context(|| format!("cannot read tensor file {arg}"))?;
    let json: TensorJson =
        serde_json::from_str(&content).with_context(|| format!("{arg} is not a tensor document"))?;
    Ok(Value::Tensor(json.into_tensor()?))
}

fn parse_scalar(dtype: DataType, literal: &str) -> Result<Scalar> {
    let invalid = || format!("'{literal}' is not a valid {dtype}");
    Ok(match dtype {
        DataType::Int32 => Scalar::Int32(literal.parse().with_context(invalid)?),
        DataType::Int64 => Scalar::Int64(literal.parse().with_context(invalid)?),
        DataType::Float32 => Scalar::Float32(literal.parse().with_context(invalid)?),
        DataType::Float64 => Scalar::Float64(literal.parse().with_context(invalid)?),
        DataType::Bool => Scalar::Bool(literal.parse().with_context(invalid)?),
        other => bail!("{other} scalars are not supported"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tensor_json_round_trip() {
        let json: TensorJson =
            serde_json::from_str(r#"{"dtype":"int32","shape":[2,2],"data":[1,2,3,4]}"#).unwrap();
        let tensor = json.into_tensor().unwrap();
        assert_eq!(tensor.to_values::<i32>().unwrap(), vec![1, 2, 3, 4]);
        let back = serde_json::to_string(&TensorJson::from_tensor(&tensor).unwrap()).unwrap();
        assert_eq!(back, r#"{"dtype":"int32","shape":[2,2],"data":[1,2,3,4]}"#);
    }

    #[test]
    fn out_of_range_int32_is_rejected() {
        let json: TensorJson =
            serde_json::from_str(r#"{"dtype":"int32","shape":[1],"data":[4294967296]}"#).unwrap();
        let err = json.into_tensor().unwrap_err();
        assert!(err.to_string().contains("element 0"), "{err}");
    }

    #[test]
    fn shape_must_match_data() {
        let json: TensorJson =
            serde_json::from_str(r#"{"dtype":"float64","shape":[3],"data":[1.0]}"#).unwrap();
        assert!(json.into_tensor().is_err());
    }

    #[test]
    fn scalars_and_files() {
        assert_eq!(parse_argument("int64:10").unwrap(), Value::Scalar(Scalar::Int64(10)));
        assert_eq!(
            parse_argument("float32:0.5").unwrap(),
            Value::Scalar(Scalar::Float32(0.5))
        );
        assert!(parse_argument("int32:abc").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dtype":"float64","shape":[],"data":[2.5]}}"#).unwrap();
        let Value::Tensor(tensor) = parse_argument(file.path().to_str().unwrap()).unwrap() else {
            panic!("expected a tensor");
        };
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.to_values::<f64>().unwrap(), vec![2.5]);
    }
}
