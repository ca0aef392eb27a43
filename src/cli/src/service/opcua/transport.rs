use std::fmt::Debug;

use crate::service::address::{NodeAddress, Protocol};
use crate::service::client::ConnectError;

/// Value as carried on the wire, before it is checked against the declared
/// tag type.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Variant {
  Empty,
  Boolean(bool),
  SByte(i8),
  Byte(u8),
  Int16(i16),
  UInt16(u16),
  Int32(i32),
  UInt32(u32),
  Int64(i64),
  UInt64(u64),
  Float(f32),
  Double(f64),
  String(String),
  Other(String),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Fault {
  #[error("Node rejected the request: {0}")]
  Node(String),

  #[error("Session failed: {0}")]
  Session(String),

  #[error("Request timed out")]
  Timeout,
}

/// Attribute reads and writes over one activated session.
#[async_trait::async_trait]
pub(crate) trait Transport: Debug + Send {
  async fn read(&mut self, node: &NodeAddress) -> Result<Variant, Fault>;

  async fn write(
    &mut self,
    node: &NodeAddress,
    value: Variant,
  ) -> Result<(), Fault>;

  async fn close(&mut self);
}

#[async_trait::async_trait]
pub(crate) trait Dial: Debug + Send + Sync {
  async fn dial(
    &self,
    endpoint: &str,
  ) -> Result<Box<dyn Transport>, ConnectError>;
}

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "opcua", allow(dead_code))]
pub(crate) struct UnsupportedDial;

#[async_trait::async_trait]
impl Dial for UnsupportedDial {
  async fn dial(
    &self,
    endpoint: &str,
  ) -> Result<Box<dyn Transport>, ConnectError> {
    tracing::warn!(
      "Refusing to open a session to {} without OPC UA support",
      endpoint
    );

    Err(ConnectError::Unsupported(Protocol::OpcUa))
  }
}
