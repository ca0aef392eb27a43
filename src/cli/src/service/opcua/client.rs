use std::io;
use std::sync::Arc;

use futures_time::future::FutureExt;

use crate::service::address::ParsedAddress;
use crate::service::client::{ConnectError, Params, ReadError, WriteError};
use crate::service::model::Value;

use super::conversion::{from_variant, to_variant};
use super::transport::{Dial, Fault, Transport};

/// One OPC UA session to one endpoint.
#[derive(Debug)]
pub(crate) struct Client {
  endpoint: String,
  dial: Arc<dyn Dial>,
  params: Params,
  transport: Option<Box<dyn Transport>>,
}

impl Client {
  pub(crate) fn new(
    endpoint: String,
    dial: Arc<dyn Dial>,
    params: Params,
  ) -> Self {
    Self {
      endpoint,
      dial,
      params,
      transport: None,
    }
  }

  pub(crate) fn is_connected(&self) -> bool {
    self.transport.is_some()
  }

  #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
  pub(crate) async fn connect(&mut self) -> Result<(), ConnectError> {
    if self.transport.is_some() {
      return Ok(());
    }

    let transport = match self
      .dial
      .dial(&self.endpoint)
      .timeout(self.params.connect_timeout())
      .await
    {
      Ok(result) => result?,
      Err(_) => return Err(ConnectError::Timeout),
    };
    self.transport = Some(transport);

    tracing::trace!("Activated session");

    Ok(())
  }

  pub(crate) async fn read_tag(
    &mut self,
    address: &ParsedAddress,
  ) -> Result<Value, ReadError> {
    let (node, data_type) = match address {
      ParsedAddress::OpcUa { node, data_type } => (node, *data_type),
      ParsedAddress::Modbus(register) => {
        return Err(ReadError::TypeMismatch {
          expected: register.data_type,
          found: "register address".to_owned(),
        })
      }
    };
    let timeout = self.params.read_timeout();
    let transport = match &mut self.transport {
      Some(transport) => transport,
      None => return Err(ReadError::NotConnected),
    };

    let variant = transport
      .read(node)
      .timeout(timeout)
      .await
      .map_err(|_| ReadError::Timeout)?
      .map_err(read_error)?;

    from_variant(&variant, data_type)
  }

  pub(crate) async fn write_tag(
    &mut self,
    address: &ParsedAddress,
    value: Value,
  ) -> Result<(), WriteError> {
    let (node, data_type) = match address {
      ParsedAddress::OpcUa { node, data_type } => (node, *data_type),
      ParsedAddress::Modbus(register) => {
        return Err(WriteError::TypeMismatch {
          expected: register.data_type,
          found: "register address".to_owned(),
        })
      }
    };
    if value.data_type() != data_type {
      return Err(WriteError::TypeMismatch {
        expected: data_type,
        found: value.data_type().to_string(),
      });
    }
    let timeout = self.params.read_timeout();
    let transport = match &mut self.transport {
      Some(transport) => transport,
      None => return Err(WriteError::NotConnected),
    };

    transport
      .write(node, to_variant(value))
      .timeout(timeout)
      .await
      .map_err(|_| WriteError::Timeout)?
      .map_err(|fault| WriteError::from(read_error(fault)))
  }

  pub(crate) async fn disconnect(&mut self) {
    if let Some(mut transport) = self.transport.take() {
      transport.close().await;
      tracing::trace!("Closed session to {}", self.endpoint);
    }
  }
}

fn read_error(fault: Fault) -> ReadError {
  match fault {
    Fault::Node(status) => ReadError::RemoteFault(status),
    Fault::Timeout => ReadError::Timeout,
    Fault::Session(reason) => ReadError::Transport(io::Error::new(
      io::ErrorKind::ConnectionAborted,
      reason,
    )),
  }
}
