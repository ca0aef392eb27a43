use crate::service::address::DataType;
use crate::service::model::Value;

// NOTE: multi-register values are packed high word first - the reference
// simulator and the field devices agree on this order

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub(crate) enum EncodingError {
  #[error("Expected {expected} registers but got {actual}")]
  Length { expected: usize, actual: usize },

  #[error("Bool values live in bit tables, not registers")]
  NotRegisters,
}

pub(crate) fn decode_registers(
  data_type: DataType,
  registers: &[u16],
) -> Result<Value, EncodingError> {
  match data_type {
    DataType::Bool => Err(EncodingError::NotRegisters),
    DataType::Int16 => {
      let [word] = take::<1>(registers)?;
      Ok(Value::Int16(word as i16))
    }
    DataType::Int32 => {
      let [high, low] = take::<2>(registers)?;
      Ok(Value::Int32(join_words(high, low) as i32))
    }
    DataType::Float32 => {
      let [high, low] = take::<2>(registers)?;
      Ok(Value::Float32(f32::from_bits(join_words(high, low))))
    }
  }
}

pub(crate) fn encode_registers(
  value: Value,
) -> Result<Vec<u16>, EncodingError> {
  match value {
    Value::Bool(_) => Err(EncodingError::NotRegisters),
    Value::Int16(value) => Ok(vec![value as u16]),
    Value::Int32(value) => Ok(split_words(value as u32).to_vec()),
    Value::Float32(value) => Ok(split_words(value.to_bits()).to_vec()),
  }
}

fn take<const N: usize>(registers: &[u16]) -> Result<[u16; N], EncodingError> {
  registers
    .get(..N)
    .and_then(|slice| <[u16; N]>::try_from(slice).ok())
    .ok_or(EncodingError::Length {
      expected: N,
      actual: registers.len(),
    })
}

fn join_words(high: u16, low: u16) -> u32 {
  u32::from(high) << 16 | u32::from(low)
}

fn split_words(value: u32) -> [u16; 2] {
  [(value >> 16) as u16, (value & 0xFFFF) as u16]
}
