use std::io;
use std::sync::Arc;

use crate::*;

use super::address::{DataType, ParsedAddress, Protocol};
use super::model::{Device, Value};
use super::{modbus, opcua};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
  #[error("Connection refused")]
  Refused(#[source] io::Error),

  #[error("Device unreachable")]
  Unreachable(#[source] io::Error),

  #[error("Connection timed out")]
  Timeout,

  #[error("Session rejected: {0}")]
  Rejected(String),

  #[error("{0} sessions are not supported by this build")]
  Unsupported(Protocol),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReadError {
  #[error("Read timed out")]
  Timeout,

  #[error("Remote fault: {0}")]
  RemoteFault(String),

  #[error("Expected {expected} but got {found}")]
  TypeMismatch { expected: DataType, found: String },

  #[error("Transport failed")]
  Transport(#[source] io::Error),

  #[error("Not connected")]
  NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WriteError {
  #[error("Write timed out")]
  Timeout,

  #[error("Remote fault: {0}")]
  RemoteFault(String),

  #[error("Expected {expected} but got {found}")]
  TypeMismatch { expected: DataType, found: String },

  #[error("Transport failed")]
  Transport(#[source] io::Error),

  #[error("Not connected")]
  NotConnected,

  #[error("Address is read only")]
  ReadOnly,
}

impl ConnectError {
  pub(crate) fn from_io(error: io::Error) -> Self {
    match error.kind() {
      io::ErrorKind::ConnectionRefused => ConnectError::Refused(error),
      io::ErrorKind::TimedOut => ConnectError::Timeout,
      _ => ConnectError::Unreachable(error),
    }
  }
}

impl ReadError {
  /// Whether the session that produced this error can no longer be trusted.
  pub(crate) fn is_transport(&self) -> bool {
    matches!(
      self,
      ReadError::Timeout | ReadError::Transport(_) | ReadError::NotConnected
    )
  }
}

impl WriteError {
  pub(crate) fn is_transport(&self) -> bool {
    matches!(
      self,
      WriteError::Timeout | WriteError::Transport(_) | WriteError::NotConnected
    )
  }
}

impl From<ReadError> for WriteError {
  fn from(error: ReadError) -> Self {
    match error {
      ReadError::Timeout => WriteError::Timeout,
      ReadError::RemoteFault(fault) => WriteError::RemoteFault(fault),
      ReadError::TypeMismatch { expected, found } => {
        WriteError::TypeMismatch { expected, found }
      }
      ReadError::Transport(error) => WriteError::Transport(error),
      ReadError::NotConnected => WriteError::NotConnected,
    }
  }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Params {
  connect_timeout: futures_time::time::Duration,
  read_timeout: futures_time::time::Duration,
}

impl Params {
  pub(crate) fn new(
    connect_timeout: chrono::Duration,
    read_timeout: chrono::Duration,
  ) -> Self {
    Self {
      connect_timeout: timeout_from_chrono(connect_timeout),
      read_timeout: timeout_from_chrono(read_timeout),
    }
  }

  pub(crate) fn connect_timeout(self) -> futures_time::time::Duration {
    self.connect_timeout
  }

  pub(crate) fn read_timeout(self) -> futures_time::time::Duration {
    self.read_timeout
  }
}

fn timeout_from_chrono(
  timeout: chrono::Duration,
) -> futures_time::time::Duration {
  futures_time::time::Duration::from_millis(
    timeout.num_milliseconds().max(0) as u64,
  )
}

/// Transport factories the clients open their sessions through.
#[derive(Clone, Debug)]
pub(crate) struct Dialers {
  pub(crate) modbus: Arc<dyn modbus::Dial>,
  pub(crate) opcua: Arc<dyn opcua::Dial>,
}

impl Dialers {
  pub(crate) fn new(config: &config::Values) -> Self {
    Self {
      modbus: Arc::new(modbus::TcpDial),
      opcua: opcua::default_dial(&config.opcua),
    }
  }
}

/// Protocol client for one device, picked by the device protocol.
#[derive(Debug)]
pub(crate) enum Client {
  OpcUa(opcua::Client),
  Modbus(modbus::Client),
}

impl Client {
  pub(crate) fn new(
    device: &Device,
    dialers: &Dialers,
    params: Params,
  ) -> Self {
    match device.protocol {
      Protocol::OpcUa => Client::OpcUa(opcua::Client::new(
        device.endpoint(),
        dialers.opcua.clone(),
        params,
      )),
      Protocol::Modbus => Client::Modbus(modbus::Client::new(
        modbus::Destination {
          host: device.host.clone(),
          port: device.port,
          slave: device.slave,
        },
        dialers.modbus.clone(),
        params,
      )),
    }
  }

  pub(crate) fn is_connected(&self) -> bool {
    match self {
      Client::OpcUa(client) => client.is_connected(),
      Client::Modbus(client) => client.is_connected(),
    }
  }

  pub(crate) async fn connect(&mut self) -> Result<(), ConnectError> {
    match self {
      Client::OpcUa(client) => client.connect().await,
      Client::Modbus(client) => client.connect().await,
    }
  }

  pub(crate) async fn read_tag(
    &mut self,
    address: &ParsedAddress,
  ) -> Result<Value, ReadError> {
    match self {
      Client::OpcUa(client) => client.read_tag(address).await,
      Client::Modbus(client) => client.read_tag(address).await,
    }
  }

  pub(crate) async fn write_tag(
    &mut self,
    address: &ParsedAddress,
    value: Value,
  ) -> Result<(), WriteError> {
    match self {
      Client::OpcUa(client) => client.write_tag(address, value).await,
      Client::Modbus(client) => client.write_tag(address, value).await,
    }
  }

  pub(crate) async fn disconnect(&mut self) {
    match self {
      Client::OpcUa(client) => client.disconnect().await,
      Client::Modbus(client) => client.disconnect(),
    }
  }
}
