use crate::service::address::DataType;
use crate::service::client::ReadError;
use crate::service::model::Value;

use super::transport::Variant;

// NOTE: integers widen into float32 and narrow into smaller integers when the
// value fits, booleans never turn into numbers and numbers never into booleans

pub(crate) fn from_variant(
  variant: &Variant,
  data_type: DataType,
) -> Result<Value, ReadError> {
  let value = match (data_type, variant) {
    (DataType::Bool, Variant::Boolean(value)) => Some(Value::Bool(*value)),
    (DataType::Int16, variant) => integer(variant)
      .and_then(|value| i16::try_from(value).ok())
      .map(Value::Int16),
    (DataType::Int32, variant) => integer(variant)
      .and_then(|value| i32::try_from(value).ok())
      .map(Value::Int32),
    (DataType::Float32, Variant::Float(value)) => Some(Value::Float32(*value)),
    (DataType::Float32, Variant::Double(value)) => narrow_double(*value),
    (DataType::Float32, variant) => {
      integer(variant).map(|value| Value::Float32(value as f32))
    }
    _ => None,
  };

  value.ok_or_else(|| ReadError::TypeMismatch {
    expected: data_type,
    found: describe(variant),
  })
}

pub(crate) fn to_variant(value: Value) -> Variant {
  match value {
    Value::Bool(value) => Variant::Boolean(value),
    Value::Int16(value) => Variant::Int16(value),
    Value::Int32(value) => Variant::Int32(value),
    Value::Float32(value) => Variant::Float(value),
  }
}

fn integer(variant: &Variant) -> Option<i128> {
  match variant {
    Variant::SByte(value) => Some(i128::from(*value)),
    Variant::Byte(value) => Some(i128::from(*value)),
    Variant::Int16(value) => Some(i128::from(*value)),
    Variant::UInt16(value) => Some(i128::from(*value)),
    Variant::Int32(value) => Some(i128::from(*value)),
    Variant::UInt32(value) => Some(i128::from(*value)),
    Variant::Int64(value) => Some(i128::from(*value)),
    Variant::UInt64(value) => Some(i128::from(*value)),
    _ => None,
  }
}

fn narrow_double(value: f64) -> Option<Value> {
  if !value.is_finite() || value.abs() > f64::from(f32::MAX) {
    return None;
  }

  Some(Value::Float32(value as f32))
}

fn describe(variant: &Variant) -> String {
  match variant {
    Variant::Empty => "empty value".to_owned(),
    Variant::Boolean(value) => format!("boolean {value}"),
    Variant::SByte(value) => format!("sbyte {value}"),
    Variant::Byte(value) => format!("byte {value}"),
    Variant::Int16(value) => format!("int16 {value}"),
    Variant::UInt16(value) => format!("uint16 {value}"),
    Variant::Int32(value) => format!("int32 {value}"),
    Variant::UInt32(value) => format!("uint32 {value}"),
    Variant::Int64(value) => format!("int64 {value}"),
    Variant::UInt64(value) => format!("uint64 {value}"),
    Variant::Float(value) => format!("float {value}"),
    Variant::Double(value) => format!("double {value}"),
    Variant::String(value) => format!("string {value:?}"),
    Variant::Other(value) => value.clone(),
  }
}
