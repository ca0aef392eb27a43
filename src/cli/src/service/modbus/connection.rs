use std::fmt::Debug;
use std::io;

use tokio::net::TcpStream;
use tokio_modbus::{
  client::Context,
  prelude::{Reader, Writer},
  Address, Quantity, Slave,
};

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct Destination {
  pub(crate) host: String,
  pub(crate) port: u16,
  pub(crate) slave: Option<u8>,
}

/// Register table operations over one open Modbus session.
#[async_trait::async_trait]
pub(crate) trait Transport: Debug + Send {
  async fn read_coils(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>>;

  async fn read_discrete_inputs(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>>;

  async fn read_input_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>>;

  async fn read_holding_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>>;

  async fn write_single_coil(
    &mut self,
    address: Address,
    value: bool,
  ) -> io::Result<()>;

  async fn write_multiple_registers(
    &mut self,
    address: Address,
    values: &[u16],
  ) -> io::Result<()>;
}

#[async_trait::async_trait]
pub(crate) trait Dial: Debug + Send + Sync {
  async fn dial(
    &self,
    destination: &Destination,
  ) -> io::Result<Box<dyn Transport>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TcpDial;

#[async_trait::async_trait]
impl Dial for TcpDial {
  #[tracing::instrument(skip(self))]
  async fn dial(
    &self,
    destination: &Destination,
  ) -> io::Result<Box<dyn Transport>> {
    let stream =
      TcpStream::connect((destination.host.as_str(), destination.port)).await?;
    let ctx = match destination.slave {
      Some(slave) => {
        tokio_modbus::prelude::tcp::attach_slave(stream, Slave(slave))
      }
      None => tokio_modbus::prelude::tcp::attach(stream),
    };

    tracing::trace!("Connected to new connection");

    Ok(Box::new(ctx))
  }
}

#[async_trait::async_trait]
impl Transport for Context {
  async fn read_coils(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>> {
    Reader::read_coils(self, address, quantity).await
  }

  async fn read_discrete_inputs(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>> {
    Reader::read_discrete_inputs(self, address, quantity).await
  }

  async fn read_input_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>> {
    Reader::read_input_registers(self, address, quantity).await
  }

  async fn read_holding_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>> {
    Reader::read_holding_registers(self, address, quantity).await
  }

  async fn write_single_coil(
    &mut self,
    address: Address,
    value: bool,
  ) -> io::Result<()> {
    Writer::write_single_coil(self, address, value).await
  }

  async fn write_multiple_registers(
    &mut self,
    address: Address,
    values: &[u16],
  ) -> io::Result<()> {
    Writer::write_multiple_registers(self, address, values).await
  }
}
