use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::address::{self, AddressError};
use super::client::{ConnectError, ReadError, WriteError};
use super::model::{Device, DeviceId, Measurement, Tag, TagId, Value};
use super::pool::Pool;
use super::store::{ConfigStore, MeasurementSink, StoreError};

/// Reads every tag of every enabled device on demand and hands the results
/// to the measurement sink.
#[derive(Clone, Debug)]
pub(crate) struct Poller {
  store: Arc<dyn ConfigStore>,
  sink: Arc<dyn MeasurementSink>,
  pool: Pool,
}

/// Outcome of reading one tag.
#[derive(Debug)]
pub(crate) struct Reading {
  pub(crate) tag: Tag,
  pub(crate) measurement: Measurement,
  pub(crate) error: Option<TagError>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TagError {
  #[error("Invalid address")]
  Address(#[from] AddressError),

  #[error("Read failed")]
  Read(#[from] ReadError),

  #[error("Device connection failed")]
  Connect,

  #[error("Session lost earlier in the pass")]
  SessionLost,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum PollError {
  #[error("Failed loading device configuration")]
  Store(#[from] StoreError),

  #[error("Device {0} not found")]
  NotFound(DeviceId),

  #[error("Failed connecting to device")]
  Connect(#[from] ConnectError),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
  #[error("Failed loading device configuration")]
  Store(#[from] StoreError),

  #[error("Device {0} not found")]
  DeviceNotFound(DeviceId),

  #[error("Tag {tag} not found on device {device}")]
  TagNotFound { device: DeviceId, tag: TagId },

  #[error("Invalid address")]
  Address(#[from] AddressError),

  #[error("Failed connecting to device")]
  Connect(#[from] ConnectError),

  #[error("Write failed")]
  Write(#[from] WriteError),
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct PassSummary {
  pub(crate) devices: usize,
  pub(crate) unreachable: usize,
  pub(crate) good: usize,
  pub(crate) bad: usize,
}

impl Reading {
  fn good(tag: &Tag, value: Value, timestamp: DateTime<Utc>) -> Self {
    Self {
      tag: tag.clone(),
      measurement: Measurement::good(tag.id, value, timestamp),
      error: None,
    }
  }

  fn bad(tag: &Tag, timestamp: DateTime<Utc>, error: TagError) -> Self {
    Self {
      tag: tag.clone(),
      measurement: Measurement::bad(tag.id, timestamp),
      error: Some(error),
    }
  }
}

impl TagError {
  fn is_transport(&self) -> bool {
    match self {
      TagError::Read(error) => error.is_transport(),
      _ => false,
    }
  }
}

impl Poller {
  pub(crate) fn new(
    store: Arc<dyn ConfigStore>,
    sink: Arc<dyn MeasurementSink>,
    pool: Pool,
  ) -> Self {
    Self { store, sink, pool }
  }

  pub(crate) fn pool(&self) -> &Pool {
    &self.pool
  }

  /// One sweep over a fresh configuration snapshot.
  #[tracing::instrument(skip(self), fields(pass = %uuid::Uuid::new_v4()))]
  pub(crate) async fn poll_pass(&self) -> Result<PassSummary, PollError> {
    let devices = self.store.list_devices().await?;
    let devices = devices
      .into_iter()
      .filter(|device| device.enabled)
      .collect::<Vec<_>>();

    let live = devices
      .iter()
      .map(|device| device.id)
      .collect::<HashSet<_>>();
    self.pool.retain(&live).await;

    let timestamp = Utc::now();
    let outcomes = join_all(
      devices
        .iter()
        .map(|device| self.poll_device(device, timestamp)),
    )
    .await;

    let mut summary = PassSummary {
      devices: devices.len(),
      ..PassSummary::default()
    };
    for outcome in outcomes {
      match outcome {
        Ok(readings) => {
          for reading in readings {
            if reading.measurement.success() {
              summary.good += 1;
            } else {
              summary.bad += 1;
            }
          }
        }
        Err(_) => summary.unreachable += 1,
      }
    }

    tracing::debug!(
      devices = summary.devices,
      unreachable = summary.unreachable,
      good = summary.good,
      bad = summary.bad,
      "Pass complete"
    );

    Ok(summary)
  }

  /// Reads one device right away, outside the regular cadence.
  #[tracing::instrument(skip(self))]
  pub(crate) async fn poll_now(
    &self,
    device: DeviceId,
  ) -> Result<Vec<Reading>, PollError> {
    let device = self
      .store
      .get_device(device)
      .await?
      .ok_or(PollError::NotFound(device))?;

    Ok(self.poll_device(&device, Utc::now()).await?)
  }

  #[tracing::instrument(skip(self, value))]
  pub(crate) async fn write_tag(
    &self,
    device: DeviceId,
    tag: TagId,
    value: Value,
  ) -> Result<(), CommandError> {
    let device = self
      .store
      .get_device(device)
      .await?
      .ok_or(CommandError::DeviceNotFound(device))?;
    let tag = device.tags.iter().find(|candidate| candidate.id == tag).ok_or(
      CommandError::TagNotFound {
        device: device.id,
        tag,
      },
    )?;
    let address =
      address::parse(device.protocol, &tag.address, tag.data_type)?;

    let mut lease = match self.pool.acquire(&device).await {
      Ok(lease) => lease,
      Err(error) => {
        self.pool.invalidate(device.id).await;
        return Err(error.into());
      }
    };

    match lease.write_tag(&address, value).await {
      Ok(()) => {
        tracing::info!("Wrote {} to {}", value, tag.name);
        Ok(())
      }
      Err(error) => {
        if error.is_transport() {
          lease.invalidate().await;
        }
        Err(error.into())
      }
    }
  }

  // NOTE: the lease is held for the whole device so a manual trigger and a
  // scheduled pass never interleave reads on one session
  async fn poll_device(
    &self,
    device: &Device,
    timestamp: DateTime<Utc>,
  ) -> Result<Vec<Reading>, ConnectError> {
    let tags = device.tags.iter().filter(|tag| tag.enabled);

    let mut lease = match self.pool.acquire(device).await {
      Ok(lease) => lease,
      Err(error) => {
        tracing::warn!(%error, "Device {} unreachable", device.name);
        self.pool.invalidate(device.id).await;
        let readings = tags
          .map(|tag| Reading::bad(tag, timestamp, TagError::Connect))
          .collect::<Vec<_>>();
        self.forward(&readings).await;
        return Err(error);
      }
    };

    let mut readings = Vec::new();
    let mut lost = false;
    for tag in tags {
      if lost {
        readings.push(Reading::bad(tag, timestamp, TagError::SessionLost));
        continue;
      }

      let result =
        match address::parse(device.protocol, &tag.address, tag.data_type) {
          Ok(address) => lease.read_tag(&address).await.map_err(TagError::from),
          Err(error) => Err(TagError::from(error)),
        };

      match result {
        Ok(value) => readings.push(Reading::good(tag, value, timestamp)),
        Err(error) => {
          tracing::warn!(
            %error,
            "Failed reading {} on {}",
            tag.name,
            device.name
          );
          lost = error.is_transport();
          readings.push(Reading::bad(tag, timestamp, error));
        }
      }
    }

    if lost {
      lease.invalidate().await;
    } else {
      drop(lease);
    }

    self.forward(&readings).await;

    Ok(readings)
  }

  async fn forward(&self, readings: &[Reading]) {
    if readings.is_empty() {
      return;
    }

    let measurements = readings
      .iter()
      .map(|reading| reading.measurement.clone())
      .collect::<Vec<_>>();
    if let Err(error) = self.sink.append(&measurements).await {
      tracing::error!(
        %error,
        "Dropped {} measurements",
        measurements.len()
      );
    }
  }
}
