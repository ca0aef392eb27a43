pub(crate) mod address;
pub(crate) mod client;
pub(crate) mod db;
pub(crate) mod model;
pub(crate) mod modbus;
pub(crate) mod opcua;
pub(crate) mod poller;
pub(crate) mod pool;
pub(crate) mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::*;

pub(crate) trait Service {
  fn new(config: config::Values) -> Self;
}

#[derive(Debug, Clone)]
pub(crate) struct Container {
  db: db::Service,
  pool: pool::Pool,
  poller: poller::Poller,
}

impl Container {
  pub(crate) fn new(config: config::Values) -> Self {
    let db = db::Service::new(config.clone());
    let pool = pool::Pool::new(config);
    let poller = poller::Poller::new(
      Arc::new(db.clone()),
      Arc::new(db.clone()),
      pool.clone(),
    );

    Self { db, pool, poller }
  }

  pub(crate) fn db(&self) -> &db::Service {
    &self.db
  }

  pub(crate) fn pool(&self) -> &pool::Pool {
    &self.pool
  }

  pub(crate) fn poller(&self) -> &poller::Poller {
    &self.poller
  }
}
