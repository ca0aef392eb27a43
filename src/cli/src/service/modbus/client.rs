use std::io;
use std::sync::Arc;

use futures_time::future::FutureExt;

use crate::service::address::{DataType, ParsedAddress, RegisterAddress, Table};
use crate::service::client::{ConnectError, Params, ReadError, WriteError};
use crate::service::model::Value;

use super::connection::{Destination, Dial, Transport};
use super::encoding::{decode_registers, encode_registers};

/// One Modbus TCP session to one device.
#[derive(Debug)]
pub(crate) struct Client {
  destination: Destination,
  dial: Arc<dyn Dial>,
  params: Params,
  transport: Option<Box<dyn Transport>>,
}

impl Client {
  pub(crate) fn new(
    destination: Destination,
    dial: Arc<dyn Dial>,
    params: Params,
  ) -> Self {
    Self {
      destination,
      dial,
      params,
      transport: None,
    }
  }

  pub(crate) fn is_connected(&self) -> bool {
    self.transport.is_some()
  }

  #[tracing::instrument(skip(self), fields(destination = ?self.destination))]
  pub(crate) async fn connect(&mut self) -> Result<(), ConnectError> {
    if self.transport.is_some() {
      return Ok(());
    }

    let transport = match self
      .dial
      .dial(&self.destination)
      .timeout(self.params.connect_timeout())
      .await
    {
      Ok(Ok(transport)) => transport,
      Ok(Err(error)) => return Err(ConnectError::from_io(error)),
      Err(_) => return Err(ConnectError::Timeout),
    };
    self.transport = Some(transport);

    Ok(())
  }

  pub(crate) async fn read_tag(
    &mut self,
    address: &ParsedAddress,
  ) -> Result<Value, ReadError> {
    let register = match address {
      ParsedAddress::Modbus(register) => *register,
      ParsedAddress::OpcUa { .. } => {
        return Err(ReadError::TypeMismatch {
          expected: address.data_type(),
          found: "node identifier".to_owned(),
        })
      }
    };
    let timeout = self.params.read_timeout();
    let transport = match &mut self.transport {
      Some(transport) => transport,
      None => return Err(ReadError::NotConnected),
    };

    let RegisterAddress {
      table,
      offset,
      data_type,
    } = register;
    let quantity = register.quantity();

    match table {
      Table::Coils | Table::DiscreteInputs => {
        if data_type != DataType::Bool {
          return Err(ReadError::TypeMismatch {
            expected: data_type,
            found: "bit".to_owned(),
          });
        }

        let bits = match table {
          Table::Coils => transport.read_coils(offset, quantity),
          _ => transport.read_discrete_inputs(offset, quantity),
        }
        .timeout(timeout)
        .await
        .map_err(|_| ReadError::Timeout)?
        .map_err(read_error)?;

        match bits.first() {
          Some(bit) => Ok(Value::Bool(*bit)),
          None => Err(ReadError::RemoteFault("empty bit response".to_owned())),
        }
      }
      Table::InputRegisters | Table::HoldingRegisters => {
        let registers = match table {
          Table::InputRegisters => {
            transport.read_input_registers(offset, quantity)
          }
          _ => transport.read_holding_registers(offset, quantity),
        }
        .timeout(timeout)
        .await
        .map_err(|_| ReadError::Timeout)?
        .map_err(read_error)?;

        decode_registers(data_type, &registers).map_err(|error| {
          ReadError::TypeMismatch {
            expected: data_type,
            found: error.to_string(),
          }
        })
      }
    }
  }

  pub(crate) async fn write_tag(
    &mut self,
    address: &ParsedAddress,
    value: Value,
  ) -> Result<(), WriteError> {
    let register = match address {
      ParsedAddress::Modbus(register) => *register,
      ParsedAddress::OpcUa { .. } => {
        return Err(WriteError::TypeMismatch {
          expected: address.data_type(),
          found: "node identifier".to_owned(),
        })
      }
    };
    if value.data_type() != register.data_type {
      return Err(WriteError::TypeMismatch {
        expected: register.data_type,
        found: value.data_type().to_string(),
      });
    }
    if !register.writable() {
      return Err(WriteError::ReadOnly);
    }
    let timeout = self.params.read_timeout();
    let transport = match &mut self.transport {
      Some(transport) => transport,
      None => return Err(WriteError::NotConnected),
    };

    let result = match value {
      Value::Bool(bit) => {
        transport
          .write_single_coil(register.offset, bit)
          .timeout(timeout)
          .await
      }
      value => {
        let registers = encode_registers(value).map_err(|error| {
          WriteError::TypeMismatch {
            expected: register.data_type,
            found: error.to_string(),
          }
        })?;
        transport
          .write_multiple_registers(register.offset, &registers)
          .timeout(timeout)
          .await
      }
    };

    result
      .map_err(|_| WriteError::Timeout)?
      .map_err(|error| WriteError::from(read_error(error)))
  }

  pub(crate) fn disconnect(&mut self) {
    if self.transport.take().is_some() {
      tracing::trace!("Disconnected from {:?}", self.destination);
    }
  }
}

// NOTE: tokio-modbus reports exception responses as ErrorKind::Other - the
// session is still usable after those
fn read_error(error: io::Error) -> ReadError {
  match error.kind() {
    io::ErrorKind::Other => ReadError::RemoteFault(error.to_string()),
    io::ErrorKind::TimedOut => ReadError::Timeout,
    _ => ReadError::Transport(error),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::service::address::{parse, Protocol};
  use crate::service::testing::{Registers, ScriptedModbusDial};

  fn client(dial: ScriptedModbusDial) -> Client {
    Client::new(
      Destination {
        host: "127.0.0.1".to_owned(),
        port: 5020,
        slave: None,
      },
      Arc::new(dial),
      Params::new(
        chrono::Duration::milliseconds(200),
        chrono::Duration::milliseconds(200),
      ),
    )
  }

  #[tokio::test]
  async fn reads_float_from_holding_registers() -> anyhow::Result<()> {
    let registers = Registers::default().holding(0, &[0x41BC, 0x0000]);
    let mut client = client(ScriptedModbusDial::new(registers));
    client.connect().await?;

    let address = parse(Protocol::Modbus, "hr_0", DataType::Float32)?;
    assert_eq!(client.read_tag(&address).await?, Value::Float32(23.5));

    Ok(())
  }

  #[tokio::test]
  async fn reads_bit_tables_as_bool() -> anyhow::Result<()> {
    let registers = Registers::default().coil(3, true).discrete(7, false);
    let mut client = client(ScriptedModbusDial::new(registers));
    client.connect().await?;

    let address = parse(Protocol::Modbus, "co_3", DataType::Bool)?;
    assert_eq!(client.read_tag(&address).await?, Value::Bool(true));

    let address = parse(Protocol::Modbus, "di_7", DataType::Bool)?;
    assert_eq!(client.read_tag(&address).await?, Value::Bool(false));

    Ok(())
  }

  #[tokio::test]
  async fn connect_is_idempotent() -> anyhow::Result<()> {
    let dial = ScriptedModbusDial::new(Registers::default());
    let sessions = dial.sessions();
    let mut client = client(dial);

    client.connect().await?;
    client.connect().await?;
    assert_eq!(sessions.opened(), 1);

    client.disconnect();
    client.disconnect();
    assert!(!client.is_connected());

    Ok(())
  }

  #[tokio::test]
  async fn refused_connection_is_typed() {
    let mut client = client(ScriptedModbusDial::refusing());
    assert!(matches!(
      client.connect().await,
      Err(ConnectError::Refused(_))
    ));
    assert!(!client.is_connected());
  }

  #[tokio::test]
  async fn exception_is_a_remote_fault_not_a_transport_fault(
  ) -> anyhow::Result<()> {
    let registers = Registers::default().holding(0, &[1]);
    let mut client = client(ScriptedModbusDial::new(registers));
    client.connect().await?;

    let address = parse(Protocol::Modbus, "hr_40", DataType::Int16)?;
    let error = client.read_tag(&address).await.err();
    assert!(matches!(error, Some(ReadError::RemoteFault(_))));
    assert!(!error.is_some_and(|error| error.is_transport()));

    Ok(())
  }

  #[tokio::test]
  async fn stalled_read_times_out() -> anyhow::Result<()> {
    let registers = Registers::default().holding(0, &[1]);
    let mut client = client(ScriptedModbusDial::new(registers).stalling());
    client.connect().await?;

    let address = parse(Protocol::Modbus, "hr_0", DataType::Int16)?;
    let error = client.read_tag(&address).await.err();
    assert!(matches!(error, Some(ReadError::Timeout)));

    Ok(())
  }

  #[tokio::test]
  async fn read_without_session_is_not_connected() -> anyhow::Result<()> {
    let mut client = client(ScriptedModbusDial::new(Registers::default()));
    let address = parse(Protocol::Modbus, "hr_0", DataType::Int16)?;
    assert!(matches!(
      client.read_tag(&address).await,
      Err(ReadError::NotConnected)
    ));

    Ok(())
  }

  #[tokio::test]
  async fn writes_float_as_two_registers() -> anyhow::Result<()> {
    let registers = Registers::default().holding(0, &[0, 0]);
    let dial = ScriptedModbusDial::new(registers);
    let sessions = dial.sessions();
    let mut client = client(dial);
    client.connect().await?;

    let address = parse(Protocol::Modbus, "hr_0", DataType::Float32)?;
    client.write_tag(&address, Value::Float32(23.5)).await?;
    assert_eq!(sessions.holding(0, 2), vec![0x41BC, 0x0000]);

    Ok(())
  }

  #[tokio::test]
  async fn input_tables_are_read_only() -> anyhow::Result<()> {
    let registers = Registers::default().input(0, &[0]);
    let mut client = client(ScriptedModbusDial::new(registers));
    client.connect().await?;

    let address = parse(Protocol::Modbus, "ir_0", DataType::Int16)?;
    assert!(matches!(
      client.write_tag(&address, Value::Int16(1)).await,
      Err(WriteError::ReadOnly)
    ));

    let address = parse(Protocol::Modbus, "hr_0", DataType::Int16)?;
    assert!(matches!(
      client.write_tag(&address, Value::Float32(1.0)).await,
      Err(WriteError::TypeMismatch { .. })
    ));

    Ok(())
  }
}
