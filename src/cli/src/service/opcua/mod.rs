mod client;
mod conversion;
mod transport;

#[cfg(feature = "opcua")]
mod session;

use std::sync::Arc;

use crate::*;

pub(crate) use client::Client;
pub(crate) use transport::Dial;
#[cfg(test)]
pub(crate) use transport::{Fault, Transport, Variant};

#[cfg(feature = "opcua")]
pub(crate) fn default_dial(config: &config::OpcUa) -> Arc<dyn Dial> {
  Arc::new(session::SessionDial::new(
    config.application_name.clone(),
    config.application_uri.clone(),
  ))
}

#[cfg(not(feature = "opcua"))]
pub(crate) fn default_dial(_config: &config::OpcUa) -> Arc<dyn Dial> {
  Arc::new(transport::UnsupportedDial)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> config::OpcUa {
    config::OpcUa {
      application_name: "Kolektor".to_owned(),
      application_uri: "urn:kolektor".to_owned(),
    }
  }

  #[cfg(feature = "opcua")]
  #[test]
  fn opcua_build_dials_real_sessions() {
    let dial = format!("{:?}", default_dial(&config()));
    assert!(dial.starts_with("SessionDial"), "{dial}");
  }

  #[cfg(not(feature = "opcua"))]
  #[tokio::test]
  async fn build_without_opcua_refuses_sessions() {
    let result = default_dial(&config())
      .dial("opc.tcp://127.0.0.1:4840")
      .await;
    assert!(matches!(
      result,
      Err(crate::service::client::ConnectError::Unsupported(_))
    ));
  }
}
