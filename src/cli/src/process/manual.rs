use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio_util::task::TaskTracker;

use crate::service::model::DeviceId;
use crate::*;

/// Polls devices on request, next to the regular passes.
///
/// A request for a device whose manual poll is still running is dropped.
pub(crate) struct Process {
  services: service::Container,
  tracker: TaskTracker,
  receiver: flume::Receiver<DeviceId>,
  in_flight: InFlight,
}

impl Process {
  pub(crate) fn new(
    services: service::Container,
    tracker: TaskTracker,
    receiver: flume::Receiver<DeviceId>,
  ) -> Self {
    Self {
      services,
      tracker,
      receiver,
      in_flight: InFlight::default(),
    }
  }
}

impl super::Process for Process {}

#[async_trait::async_trait]
impl super::Continuous for Process {
  async fn run(&self) -> anyhow::Result<()> {
    while let Ok(device) = self.receiver.recv_async().await {
      let Some(claim) = self.in_flight.claim(device) else {
        tracing::debug!("Manual poll of device {} already running", device);
        continue;
      };

      let poller = self.services.poller().clone();
      self.tracker.spawn(async move {
        match poller.poll_now(device).await {
          Ok(readings) => {
            let failed = readings
              .iter()
              .filter(|reading| reading.error.is_some())
              .count();
            tracing::info!(
              "Manual poll of device {} read {} tags, {} failed",
              device,
              readings.len(),
              failed
            );
          }
          Err(error) => {
            tracing::warn!(%error, "Manual poll of device {} failed", device);
          }
        }
        drop(claim);
      });
    }

    Ok(())
  }
}

#[derive(Clone, Debug, Default)]
struct InFlight {
  devices: Arc<Mutex<HashSet<DeviceId>>>,
}

/// Marks a device as being polled until dropped.
#[derive(Debug)]
struct Claim {
  device: DeviceId,
  devices: Arc<Mutex<HashSet<DeviceId>>>,
}

impl InFlight {
  fn claim(&self, device: DeviceId) -> Option<Claim> {
    let mut devices = self
      .devices
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !devices.insert(device) {
      return None;
    }

    Some(Claim {
      device,
      devices: self.devices.clone(),
    })
  }
}

impl Drop for Claim {
  fn drop(&mut self) {
    self
      .devices
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .remove(&self.device);
  }
}
