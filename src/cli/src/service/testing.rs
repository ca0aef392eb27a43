use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_modbus::{Address, Quantity};

use super::address::{DataType, NodeAddress, Protocol};
use super::client::ConnectError;
use super::model::{Device, DeviceId, Measurement, Tag};
use super::store::{ConfigStore, MeasurementSink, SinkError, StoreError};
use super::{modbus, opcua};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn device(
  id: DeviceId,
  name: &str,
  protocol: Protocol,
  tags: &[(i64, &str, &str, DataType)],
) -> Device {
  Device {
    id,
    name: name.to_owned(),
    description: None,
    enabled: true,
    protocol,
    host: "127.0.0.1".to_owned(),
    port: match protocol {
      Protocol::OpcUa => 4840,
      Protocol::Modbus => 502,
    },
    endpoint_url: None,
    slave: None,
    tags: tags
      .iter()
      .map(|(tag_id, name, address, data_type)| Tag {
        id: *tag_id,
        device_id: id,
        name: (*name).to_owned(),
        description: None,
        enabled: true,
        address: (*address).to_owned(),
        data_type: *data_type,
      })
      .collect(),
  }
}

/// Configuration store and measurement sink kept in memory.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemoryStore {
  devices: Arc<Mutex<Vec<Device>>>,
  measurements: Arc<Mutex<Vec<Measurement>>>,
  failing: bool,
}

impl MemoryStore {
  pub(crate) fn new(devices: Vec<Device>) -> Self {
    Self {
      devices: Arc::new(Mutex::new(devices)),
      ..Self::default()
    }
  }

  pub(crate) fn failing_sink(mut self) -> Self {
    self.failing = true;
    self
  }

  pub(crate) fn set_devices(&self, devices: Vec<Device>) {
    *lock(&self.devices) = devices;
  }

  pub(crate) fn measurements(&self) -> Vec<Measurement> {
    lock(&self.measurements).clone()
  }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
  async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
    Ok(lock(&self.devices).clone())
  }

  async fn get_device(
    &self,
    id: DeviceId,
  ) -> Result<Option<Device>, StoreError> {
    Ok(lock(&self.devices).iter().find(|device| device.id == id).cloned())
  }
}

#[async_trait::async_trait]
impl MeasurementSink for MemoryStore {
  async fn append(
    &self,
    measurements: &[Measurement],
  ) -> Result<(), SinkError> {
    if self.failing {
      return Err(SinkError::Sqlx(sqlx::Error::PoolTimedOut));
    }

    lock(&self.measurements).extend_from_slice(measurements);

    Ok(())
  }
}

/// Register tables served by [`ScriptedModbusDial`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Registers {
  coils: HashMap<Address, bool>,
  discrete_inputs: HashMap<Address, bool>,
  input_registers: HashMap<Address, u16>,
  holding_registers: HashMap<Address, u16>,
}

impl Registers {
  pub(crate) fn coil(mut self, address: Address, value: bool) -> Self {
    self.coils.insert(address, value);
    self
  }

  pub(crate) fn discrete(mut self, address: Address, value: bool) -> Self {
    self.discrete_inputs.insert(address, value);
    self
  }

  pub(crate) fn input(mut self, address: Address, values: &[u16]) -> Self {
    extend(&mut self.input_registers, address, values);
    self
  }

  pub(crate) fn holding(mut self, address: Address, values: &[u16]) -> Self {
    extend(&mut self.holding_registers, address, values);
    self
  }
}

fn extend<T: Copy>(
  table: &mut HashMap<Address, T>,
  start: Address,
  values: &[T],
) {
  for (address, value) in (start..).zip(values.iter()) {
    table.insert(address, *value);
  }
}

fn span<T: Copy>(
  table: &HashMap<Address, T>,
  address: Address,
  quantity: Quantity,
) -> io::Result<Vec<T>> {
  (0..quantity)
    .map(|index| {
      address
        .checked_add(index)
        .and_then(|address| table.get(&address).copied())
        .ok_or_else(|| {
          io::Error::new(
            io::ErrorKind::Other,
            "Modbus exception: illegal data address",
          )
        })
    })
    .collect()
}

/// Counters shared by every session one scripted dial opened.
#[derive(Clone, Debug, Default)]
pub(crate) struct Sessions {
  opened: Arc<AtomicUsize>,
  live: Arc<AtomicUsize>,
  max_live: Arc<AtomicUsize>,
  registers: Arc<Mutex<Registers>>,
}

impl Sessions {
  pub(crate) fn opened(&self) -> usize {
    self.opened.load(Ordering::SeqCst)
  }

  pub(crate) fn live(&self) -> usize {
    self.live.load(Ordering::SeqCst)
  }

  pub(crate) fn max_live(&self) -> usize {
    self.max_live.load(Ordering::SeqCst)
  }

  pub(crate) fn holding(
    &self,
    address: Address,
    quantity: Quantity,
  ) -> Vec<u16> {
    span(&lock(&self.registers).holding_registers, address, quantity)
      .unwrap_or_default()
  }

  fn open(&self) {
    self.opened.fetch_add(1, Ordering::SeqCst);
    let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_live.fetch_max(live, Ordering::SeqCst);
  }

  fn close(&self) {
    self.live.fetch_sub(1, Ordering::SeqCst);
  }
}

#[derive(Clone, Debug)]
enum Script {
  Serve,
  Refuse,
}

/// Modbus dial that serves fixed register tables instead of a device.
#[derive(Clone, Debug)]
pub(crate) struct ScriptedModbusDial {
  script: Script,
  sessions: Sessions,
  connect_delay: Duration,
  stall: bool,
  reset_after: Option<usize>,
}

impl ScriptedModbusDial {
  pub(crate) fn new(registers: Registers) -> Self {
    Self {
      script: Script::Serve,
      sessions: Sessions {
        registers: Arc::new(Mutex::new(registers)),
        ..Sessions::default()
      },
      connect_delay: Duration::ZERO,
      stall: false,
      reset_after: None,
    }
  }

  pub(crate) fn refusing() -> Self {
    Self {
      script: Script::Refuse,
      ..Self::new(Registers::default())
    }
  }

  /// Reads never answer.
  pub(crate) fn stalling(mut self) -> Self {
    self.stall = true;
    self
  }

  pub(crate) fn connect_delay(mut self, delay: Duration) -> Self {
    self.connect_delay = delay;
    self
  }

  /// The peer resets every session after this many reads.
  pub(crate) fn reset_after(mut self, reads: usize) -> Self {
    self.reset_after = Some(reads);
    self
  }

  pub(crate) fn sessions(&self) -> Sessions {
    self.sessions.clone()
  }
}

#[async_trait::async_trait]
impl modbus::Dial for ScriptedModbusDial {
  async fn dial(
    &self,
    _destination: &modbus::Destination,
  ) -> io::Result<Box<dyn modbus::Transport>> {
    tokio::time::sleep(self.connect_delay).await;

    match self.script {
      Script::Refuse => Err(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
      )),
      Script::Serve => {
        self.sessions.open();
        Ok(Box::new(ScriptedModbusTransport {
          sessions: self.sessions.clone(),
          stall: self.stall,
          reads_left: self.reset_after,
        }))
      }
    }
  }
}

#[derive(Debug)]
struct ScriptedModbusTransport {
  sessions: Sessions,
  stall: bool,
  reads_left: Option<usize>,
}

impl ScriptedModbusTransport {
  async fn exchange(&mut self) -> io::Result<()> {
    if self.stall {
      tokio::time::sleep(Duration::from_secs(60)).await;
    }

    match &mut self.reads_left {
      Some(0) => Err(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
      )),
      Some(left) => {
        *left -= 1;
        Ok(())
      }
      None => Ok(()),
    }
  }
}

impl Drop for ScriptedModbusTransport {
  fn drop(&mut self) {
    self.sessions.close();
  }
}

#[async_trait::async_trait]
impl modbus::Transport for ScriptedModbusTransport {
  async fn read_coils(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>> {
    self.exchange().await?;
    span(&lock(&self.sessions.registers).coils, address, quantity)
  }

  async fn read_discrete_inputs(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<bool>> {
    self.exchange().await?;
    span(&lock(&self.sessions.registers).discrete_inputs, address, quantity)
  }

  async fn read_input_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>> {
    self.exchange().await?;
    span(&lock(&self.sessions.registers).input_registers, address, quantity)
  }

  async fn read_holding_registers(
    &mut self,
    address: Address,
    quantity: Quantity,
  ) -> io::Result<Vec<u16>> {
    self.exchange().await?;
    span(
      &lock(&self.sessions.registers).holding_registers,
      address,
      quantity,
    )
  }

  async fn write_single_coil(
    &mut self,
    address: Address,
    value: bool,
  ) -> io::Result<()> {
    self.exchange().await?;
    let mut registers = lock(&self.sessions.registers);
    span(&registers.coils, address, 1)?;
    registers.coils.insert(address, value);
    Ok(())
  }

  async fn write_multiple_registers(
    &mut self,
    address: Address,
    values: &[u16],
  ) -> io::Result<()> {
    self.exchange().await?;
    let mut registers = lock(&self.sessions.registers);
    span(&registers.holding_registers, address, values.len() as Quantity)?;
    extend(&mut registers.holding_registers, address, values);
    Ok(())
  }
}

/// Node values served by [`ScriptedOpcUaDial`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Nodes {
  values: Arc<Mutex<HashMap<String, opcua::Variant>>>,
}

impl Nodes {
  pub(crate) fn get(&self, node: &str) -> Option<opcua::Variant> {
    lock(&self.values).get(node).cloned()
  }
}

/// OPC UA dial that serves fixed node values instead of a server.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedOpcUaDial {
  nodes: Nodes,
  rejecting: bool,
}

impl ScriptedOpcUaDial {
  pub(crate) fn rejecting() -> Self {
    Self {
      rejecting: true,
      ..Self::default()
    }
  }

  pub(crate) fn node(self, node: &str, value: opcua::Variant) -> Self {
    lock(&self.nodes.values).insert(node.to_owned(), value);
    self
  }

  pub(crate) fn nodes(&self) -> Nodes {
    self.nodes.clone()
  }
}

#[async_trait::async_trait]
impl opcua::Dial for ScriptedOpcUaDial {
  async fn dial(
    &self,
    _endpoint: &str,
  ) -> Result<Box<dyn opcua::Transport>, ConnectError> {
    if self.rejecting {
      return Err(ConnectError::Rejected(
        "BadIdentityTokenRejected".to_owned(),
      ));
    }

    Ok(Box::new(ScriptedOpcUaTransport {
      nodes: self.nodes.clone(),
      open: true,
    }))
  }
}

#[derive(Debug)]
struct ScriptedOpcUaTransport {
  nodes: Nodes,
  open: bool,
}

#[async_trait::async_trait]
impl opcua::Transport for ScriptedOpcUaTransport {
  async fn read(
    &mut self,
    node: &NodeAddress,
  ) -> Result<opcua::Variant, opcua::Fault> {
    if !self.open {
      return Err(opcua::Fault::Session("BadSessionClosed".to_owned()));
    }

    self
      .nodes
      .get(&node.to_string())
      .ok_or_else(|| opcua::Fault::Node("BadNodeIdUnknown".to_owned()))
  }

  async fn write(
    &mut self,
    node: &NodeAddress,
    value: opcua::Variant,
  ) -> Result<(), opcua::Fault> {
    if !self.open {
      return Err(opcua::Fault::Session("BadSessionClosed".to_owned()));
    }

    let mut values = lock(&self.nodes.values);
    match values.get_mut(&node.to_string()) {
      Some(slot) => {
        *slot = value;
        Ok(())
      }
      None => Err(opcua::Fault::Node("BadNodeIdUnknown".to_owned())),
    }
  }

  async fn close(&mut self) {
    self.open = false;
  }
}
