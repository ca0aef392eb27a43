use std::fmt::Display;

use chrono::{DateTime, Utc};

use super::address::{DataType, Protocol};

pub(crate) type DeviceId = i64;
pub(crate) type TagId = i64;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Device {
  pub(crate) id: DeviceId,
  pub(crate) name: String,
  pub(crate) description: Option<String>,
  pub(crate) enabled: bool,
  pub(crate) protocol: Protocol,
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) endpoint_url: Option<String>,
  pub(crate) slave: Option<u8>,
  pub(crate) tags: Vec<Tag>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Tag {
  pub(crate) id: TagId,
  pub(crate) device_id: DeviceId,
  pub(crate) name: String,
  pub(crate) description: Option<String>,
  pub(crate) enabled: bool,
  pub(crate) address: String,
  pub(crate) data_type: DataType,
}

/// Typed value as read from or written to a device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Value {
  Bool(bool),
  Int16(i16),
  Int32(i32),
  Float32(f32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "measurement_quality", rename_all = "lowercase")]
pub(crate) enum Quality {
  Good,
  Bad,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Measurement {
  pub(crate) tag_id: TagId,
  pub(crate) value: Option<Value>,
  pub(crate) timestamp: DateTime<Utc>,
  pub(crate) quality: Quality,
}

#[derive(Debug, thiserror::Error)]
#[error("Cannot parse {raw:?} as {data_type}")]
pub(crate) struct ValueParseError {
  raw: String,
  data_type: DataType,
}

impl Device {
  /// Connection target that decides whether a pooled session still matches
  /// this device after a configuration edit.
  pub(crate) fn target(&self) -> String {
    match self.protocol {
      Protocol::OpcUa => format!("opcua://{}", self.endpoint()),
      Protocol::Modbus => match self.slave {
        Some(slave) => {
          format!("modbus://{}:{}/{}", self.host, self.port, slave)
        }
        None => format!("modbus://{}:{}", self.host, self.port),
      },
    }
  }

  pub(crate) fn endpoint(&self) -> String {
    match &self.endpoint_url {
      Some(endpoint_url) => endpoint_url.clone(),
      None => format!("opc.tcp://{}:{}", self.host, self.port),
    }
  }
}

impl Value {
  pub(crate) fn data_type(&self) -> DataType {
    match self {
      Value::Bool(_) => DataType::Bool,
      Value::Int16(_) => DataType::Int16,
      Value::Int32(_) => DataType::Int32,
      Value::Float32(_) => DataType::Float32,
    }
  }

  /// Numeric form stored by the measurement sink.
  pub(crate) fn as_f64(&self) -> f64 {
    match self {
      Value::Bool(value) => f64::from(u8::from(*value)),
      Value::Int16(value) => f64::from(*value),
      Value::Int32(value) => f64::from(*value),
      Value::Float32(value) => f64::from(*value),
    }
  }

  pub(crate) fn parse(
    data_type: DataType,
    raw: &str,
  ) -> Result<Self, ValueParseError> {
    let trimmed = raw.trim();
    let value = match data_type {
      DataType::Bool => match trimmed.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(Value::Bool(true)),
        "0" | "false" | "off" => Some(Value::Bool(false)),
        _ => None,
      },
      DataType::Int16 => trimmed.parse().ok().map(Value::Int16),
      DataType::Int32 => trimmed.parse().ok().map(Value::Int32),
      DataType::Float32 => trimmed
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .map(Value::Float32),
    };

    value.ok_or_else(|| ValueParseError {
      raw: raw.to_owned(),
      data_type,
    })
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Value::Bool(value) => Display::fmt(value, f),
      Value::Int16(value) => Display::fmt(value, f),
      Value::Int32(value) => Display::fmt(value, f),
      Value::Float32(value) => Display::fmt(value, f),
    }
  }
}

impl Measurement {
  pub(crate) fn good(
    tag_id: TagId,
    value: Value,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      tag_id,
      value: Some(value),
      timestamp,
      quality: Quality::Good,
    }
  }

  pub(crate) fn bad(tag_id: TagId, timestamp: DateTime<Utc>) -> Self {
    Self {
      tag_id,
      value: None,
      timestamp,
      quality: Quality::Bad,
    }
  }

  pub(crate) fn success(&self) -> bool {
    self.quality == Quality::Good
  }
}
