use std::fmt::Debug;

use super::model::{Device, DeviceId, Measurement};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
  #[error("Failed querying configuration")]
  Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SinkError {
  #[error("Failed appending measurements")]
  Sqlx(#[from] sqlx::Error),
}

/// Committed device configuration, read as one consistent snapshot.
#[async_trait::async_trait]
pub(crate) trait ConfigStore: Debug + Send + Sync {
  /// Every device with its tags, disabled ones included.
  async fn list_devices(&self) -> Result<Vec<Device>, StoreError>;

  async fn get_device(
    &self,
    id: DeviceId,
  ) -> Result<Option<Device>, StoreError>;
}

/// Append-only destination for measurements.
#[async_trait::async_trait]
pub(crate) trait MeasurementSink: Debug + Send + Sync {
  async fn append(&self, measurements: &[Measurement])
    -> Result<(), SinkError>;
}
