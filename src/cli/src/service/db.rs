use std::collections::HashMap;

use sqlx::{
  migrate::Migrator, postgres::PgListener, FromRow, Pool, Postgres,
  QueryBuilder,
};
use thiserror::Error;

use crate::*;

use super::address::{DataType, Protocol};
use super::model::{self, DeviceId};
use super::store::{ConfigStore, MeasurementSink, SinkError, StoreError};

#[derive(Debug, Clone)]
pub(crate) struct Service {
  pool: Pool<Postgres>,
}

#[derive(Debug, Clone, FromRow)]
struct Device {
  id: i64,
  name: String,
  description: Option<String>,
  enabled: bool,
  protocol: String,
  host: String,
  port: i32,
  endpoint_url: Option<String>,
  slave: Option<i16>,
}

#[derive(Debug, Clone, FromRow)]
struct Tag {
  id: i64,
  device_id: i64,
  name: String,
  description: Option<String>,
  enabled: bool,
  address: String,
  data_type: String,
}

#[derive(Debug, Error)]
pub(crate) enum Error {
  #[error("Sqlx error")]
  Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub(crate) enum MigrateError {
  #[error("Migration failed")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

impl service::Service for Service {
  fn new(config: config::Values) -> Self {
    let mut options = sqlx::postgres::PgConnectOptions::new()
      .host(&config.db.domain)
      .username(&config.db.user)
      .database(&config.db.name)
      .options([(
        "statement_timeout",
        &config.db.timeout.num_milliseconds().to_string(),
      )]);

    if let Some(port) = config.db.port {
      options = options.port(port);
    }

    if let Some(password) = config.db.password {
      options = options.password(password.as_str());
    }

    options = options.ssl_mode(sqlx::postgres::PgSslMode::Disable);
    if config.db.ssl {
      options = options.ssl_mode(sqlx::postgres::PgSslMode::Require);
    }

    let pool = sqlx::Pool::connect_lazy_with(options);

    Self { pool }
  }
}

impl Service {
  #[tracing::instrument(skip(self))]
  pub(crate) async fn migrate(&self) -> Result<(), MigrateError> {
    MIGRATOR.run(&self.pool).await?;

    tracing::info!("Migration ran successfully");

    Ok(())
  }

  #[tracing::instrument(skip(self))]
  pub(crate) async fn listen(
    &self,
    channel: &str,
  ) -> Result<PgListener, Error> {
    let mut listener = PgListener::connect_with(&self.pool).await?;
    listener.listen(channel).await?;

    tracing::trace!("Listening on {}", channel);

    Ok(listener)
  }
}

#[async_trait::async_trait]
impl ConfigStore for Service {
  #[tracing::instrument(skip(self))]
  async fn list_devices(&self) -> Result<Vec<model::Device>, StoreError> {
    // NOTE: one snapshot so a device is never seen without its tags
    let mut transaction = self.pool.begin().await?;
    sqlx::query("set transaction isolation level repeatable read, read only")
      .execute(&mut *transaction)
      .await?;

    let devices = sqlx::query_as::<_, Device>(
      r#"
        select id, name, description, enabled, protocol, host, port,
          endpoint_url, slave
        from devices
        order by id
      "#,
    )
    .fetch_all(&mut *transaction)
    .await?;

    let tags = sqlx::query_as::<_, Tag>(
      r#"
        select id, device_id, name, description, enabled, address, data_type
        from tags
        order by device_id, id
      "#,
    )
    .fetch_all(&mut *transaction)
    .await?;

    transaction.commit().await?;

    let mut tags_by_device = HashMap::<DeviceId, Vec<Tag>>::new();
    for tag in tags {
      tags_by_device.entry(tag.device_id).or_default().push(tag);
    }

    let devices = devices
      .into_iter()
      .filter_map(|device| {
        let tags = tags_by_device.remove(&device.id).unwrap_or_default();
        to_model_device(device, tags)
      })
      .collect::<Vec<_>>();

    tracing::trace!("Fetched {} devices", devices.len());

    Ok(devices)
  }

  #[tracing::instrument(skip(self))]
  async fn get_device(
    &self,
    id: DeviceId,
  ) -> Result<Option<model::Device>, StoreError> {
    let mut transaction = self.pool.begin().await?;
    sqlx::query("set transaction isolation level repeatable read, read only")
      .execute(&mut *transaction)
      .await?;

    let device = sqlx::query_as::<_, Device>(
      r#"
        select id, name, description, enabled, protocol, host, port,
          endpoint_url, slave
        from devices
        where id = $1
      "#,
    )
    .bind(id)
    .fetch_optional(&mut *transaction)
    .await?;

    let tags = sqlx::query_as::<_, Tag>(
      r#"
        select id, device_id, name, description, enabled, address, data_type
        from tags
        where device_id = $1
        order by id
      "#,
    )
    .bind(id)
    .fetch_all(&mut *transaction)
    .await?;

    transaction.commit().await?;

    tracing::trace!("Fetched device");

    Ok(device.and_then(|device| to_model_device(device, tags)))
  }
}

#[async_trait::async_trait]
impl MeasurementSink for Service {
  #[tracing::instrument(skip_all, fields(count = measurements.len()))]
  async fn append(
    &self,
    measurements: &[model::Measurement],
  ) -> Result<(), SinkError> {
    if measurements.is_empty() {
      return Ok(());
    }

    QueryBuilder::new(
      "insert into measurements (tag_id, value, timestamp, quality)",
    )
    .push_values(measurements, |mut binder, measurement| {
      binder
        .push_bind(measurement.tag_id)
        .push_bind(measurement.value.map(|value| value.as_f64()))
        .push_bind(measurement.timestamp)
        .push_bind(measurement.quality);
    })
    .build()
    .execute(&self.pool)
    .await?;

    tracing::trace!("Inserted measurements");

    Ok(())
  }
}

// NOTE: rows that do not map onto the model are skipped so one bad edit
// cannot stall the whole fleet

fn to_model_device(device: Device, tags: Vec<Tag>) -> Option<model::Device> {
  let protocol = match device.protocol.parse::<Protocol>() {
    Ok(protocol) => protocol,
    Err(error) => {
      tracing::warn!(%error, "Skipping device {}", device.id);
      return None;
    }
  };
  let Ok(port) = u16::try_from(device.port) else {
    tracing::warn!("Skipping device {} with port {}", device.id, device.port);
    return None;
  };
  let slave = match device.slave.map(u8::try_from) {
    None => None,
    Some(Ok(slave)) => Some(slave),
    Some(Err(_)) => {
      tracing::warn!(
        "Skipping device {} with unit id {:?}",
        device.id,
        device.slave
      );
      return None;
    }
  };

  Some(model::Device {
    id: device.id,
    name: device.name,
    description: device.description,
    enabled: device.enabled,
    protocol,
    host: device.host,
    port,
    endpoint_url: device.endpoint_url,
    slave,
    tags: tags.into_iter().filter_map(to_model_tag).collect(),
  })
}

fn to_model_tag(tag: Tag) -> Option<model::Tag> {
  let data_type = match tag.data_type.parse::<DataType>() {
    Ok(data_type) => data_type,
    Err(error) => {
      tracing::warn!(%error, "Skipping tag {}", tag.id);
      return None;
    }
  };

  Some(model::Tag {
    id: tag.id,
    device_id: tag.device_id,
    name: tag.name,
    description: tag.description,
    enabled: tag.enabled,
    address: tag.address,
    data_type,
  })
}

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");
