use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::*;

use super::address::ParsedAddress;
use super::client::{
  Client, ConnectError, Dialers, Params, ReadError, WriteError,
};
use super::model::{Device, DeviceId, Value};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
  Failed {
    error: String,
    failed_at: DateTime<Utc>,
  },
}

#[derive(Debug)]
struct Slot {
  target: String,
  client: Option<Client>,
}

type Slots = Arc<Mutex<HashMap<DeviceId, Arc<Mutex<Slot>>>>>;
type States = Arc<Mutex<HashMap<DeviceId, ConnectionState>>>;

/// At most one live protocol client per device.
///
/// Every session operation on a device happens while holding that device's
/// slot lock, so scheduled passes and manual triggers racing on the same
/// device are serialized and never open a second session.
#[derive(Clone, Debug)]
pub(crate) struct Pool {
  slots: Slots,
  states: States,
  dialers: Dialers,
  params: Params,
}

/// Exclusive use of one device's connected client.
#[derive(Debug)]
pub(crate) struct Lease {
  device: DeviceId,
  slot: OwnedMutexGuard<Slot>,
  states: States,
}

impl service::Service for Pool {
  fn new(config: config::Values) -> Self {
    Self::with_dialers(
      Dialers::new(&config),
      Params::new(
        config.acquisition.connect_timeout,
        config.acquisition.read_timeout,
      ),
    )
  }
}

impl Pool {
  pub(crate) fn with_dialers(dialers: Dialers, params: Params) -> Self {
    Self {
      slots: Arc::new(Mutex::new(HashMap::new())),
      states: Arc::new(Mutex::new(HashMap::new())),
      dialers,
      params,
    }
  }

  pub(crate) async fn state(&self, device: DeviceId) -> ConnectionState {
    self
      .states
      .lock()
      .await
      .get(&device)
      .cloned()
      .unwrap_or(ConnectionState::Disconnected)
  }

  #[tracing::instrument(skip_all, fields(device = device.id))]
  pub(crate) async fn acquire(
    &self,
    device: &Device,
  ) -> Result<Lease, ConnectError> {
    let target = device.target();
    let mut slot = self.lock_slot(device.id, &target).await;

    if slot.target != target {
      if let Some(mut client) = slot.client.take() {
        tracing::debug!("Device moved to {}, dropping old session", target);
        client.disconnect().await;
      }
      slot.target = target;
    }

    let healthy = slot
      .client
      .as_ref()
      .is_some_and(|client| client.is_connected());
    if !healthy {
      slot.client = None;
      set_state(&self.states, device.id, ConnectionState::Connecting).await;

      let mut client = Client::new(device, &self.dialers, self.params);
      if let Err(error) = client.connect().await {
        set_state(
          &self.states,
          device.id,
          ConnectionState::Failed {
            error: error.to_string(),
            failed_at: Utc::now(),
          },
        )
        .await;
        return Err(error);
      }

      tracing::trace!("Connected");
      slot.client = Some(client);
      set_state(&self.states, device.id, ConnectionState::Connected).await;
    }

    Ok(Lease {
      device: device.id,
      slot,
      states: self.states.clone(),
    })
  }

  // NOTE: a slot pruned while we waited for its lock is orphaned, so take
  // the lock again on whatever slot the map holds now
  async fn lock_slot(
    &self,
    device: DeviceId,
    target: &str,
  ) -> OwnedMutexGuard<Slot> {
    loop {
      let slot = {
        let mut slots = self.slots.lock().await;
        slots
          .entry(device)
          .or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
              target: target.to_owned(),
              client: None,
            }))
          })
          .clone()
      };
      let guard = slot.clone().lock_owned().await;

      let current = self
        .slots
        .lock()
        .await
        .get(&device)
        .is_some_and(|registered| Arc::ptr_eq(registered, &slot));
      if current {
        return guard;
      }
    }
  }

  /// Drops the pooled client of a device so the next acquire reconnects.
  #[tracing::instrument(skip(self))]
  pub(crate) async fn invalidate(&self, device: DeviceId) {
    let slot = self.slots.lock().await.get(&device).cloned();
    if let Some(slot) = slot {
      let mut slot = slot.lock_owned().await;
      if let Some(mut client) = slot.client.take() {
        client.disconnect().await;
        set_state(&self.states, device, ConnectionState::Disconnected).await;
      }
    }
  }

  /// Disconnects and forgets every device not in `devices`.
  ///
  /// Slots in use are left alone and pruned by a later call, so a pass
  /// never waits on a manual poll of a device it no longer polls.
  pub(crate) async fn retain(&self, devices: &HashSet<DeviceId>) {
    let removed = {
      let mut slots = self.slots.lock().await;
      let stale = slots
        .iter()
        .filter(|(device, _)| !devices.contains(device))
        .filter_map(|(device, slot)| {
          slot.clone().try_lock_owned().ok().map(|guard| (*device, guard))
        })
        .collect::<Vec<_>>();

      let mut states = self.states.lock().await;
      for (device, _) in &stale {
        slots.remove(device);
        states.remove(device);
      }
      stale
    };

    for (device, mut slot) in removed {
      if let Some(mut client) = slot.client.take() {
        tracing::debug!("Pruning session of removed device {}", device);
        client.disconnect().await;
      }
    }
  }

  #[tracing::instrument(skip(self))]
  pub(crate) async fn shutdown(&self) {
    let slots = {
      let mut slots = self.slots.lock().await;
      slots.drain().collect::<Vec<_>>()
    };

    for (device, slot) in slots {
      let mut slot = slot.lock_owned().await;
      if let Some(mut client) = slot.client.take() {
        client.disconnect().await;
      }
      set_state(&self.states, device, ConnectionState::Disconnected).await;
    }

    tracing::info!("Disconnected all devices");
  }
}

impl Lease {
  pub(crate) async fn read_tag(
    &mut self,
    address: &ParsedAddress,
  ) -> Result<Value, ReadError> {
    match self.slot.client.as_mut() {
      Some(client) => client.read_tag(address).await,
      None => Err(ReadError::NotConnected),
    }
  }

  pub(crate) async fn write_tag(
    &mut self,
    address: &ParsedAddress,
    value: Value,
  ) -> Result<(), WriteError> {
    match self.slot.client.as_mut() {
      Some(client) => client.write_tag(address, value).await,
      None => Err(WriteError::NotConnected),
    }
  }

  /// Tears the session down after a transport fault.
  pub(crate) async fn invalidate(mut self) {
    if let Some(mut client) = self.slot.client.take() {
      client.disconnect().await;
    }
    set_state(&self.states, self.device, ConnectionState::Disconnected).await;
  }
}

async fn set_state(
  states: &States,
  device: DeviceId,
  state: ConnectionState,
) {
  states.lock().await.insert(device, state);
}
