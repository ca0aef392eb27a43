use std::io;
use std::sync::Arc;

use opcua::client::prelude::{
  AttributeService, ClientBuilder, IdentityToken, Session,
};
use opcua::crypto::SecurityPolicy;
use opcua::sync::RwLock;
use opcua::types::{
  AttributeId, DataValue, MessageSecurityMode, NodeId, QualifiedName,
  ReadValueId, StatusCode, TimestampsToReturn, UAString, UserTokenPolicy,
  Variant as UaVariant, WriteValue,
};

use crate::service::address::{NodeAddress, NodeIdentifier};
use crate::service::client::ConnectError;

use super::transport::{Dial, Fault, Transport, Variant};

// NOTE: the opcua client drives its own runtime and blocks the calling
// thread, so every session call hops onto the blocking pool

#[derive(Clone, Debug)]
pub(crate) struct SessionDial {
  application_name: String,
  application_uri: String,
}

impl SessionDial {
  pub(crate) fn new(application_name: String, application_uri: String) -> Self {
    Self {
      application_name,
      application_uri,
    }
  }
}

#[async_trait::async_trait]
impl Dial for SessionDial {
  #[tracing::instrument(skip(self))]
  async fn dial(
    &self,
    endpoint: &str,
  ) -> Result<Box<dyn Transport>, ConnectError> {
    let endpoint = endpoint.to_owned();
    let application_name = self.application_name.clone();
    let application_uri = self.application_uri.clone();

    let session = tokio::task::spawn_blocking(move || {
      let mut client = ClientBuilder::new()
        .application_name(application_name)
        .application_uri(application_uri)
        .trust_server_certs(true)
        .create_sample_keypair(true)
        .session_retry_limit(0)
        .client()
        .ok_or_else(|| {
          ConnectError::Rejected("invalid client configuration".to_owned())
        })?;

      client
        .connect_to_endpoint(
          (
            endpoint.as_str(),
            SecurityPolicy::None.to_str(),
            MessageSecurityMode::None,
            UserTokenPolicy::anonymous(),
          ),
          IdentityToken::Anonymous,
        )
        .map_err(connect_error)
    })
    .await
    .map_err(|error| {
      ConnectError::Unreachable(io::Error::new(io::ErrorKind::Other, error))
    })??;

    tracing::trace!("Activated anonymous session");

    Ok(Box::new(SessionTransport {
      session: Some(session),
    }))
  }
}

struct SessionTransport {
  session: Option<Arc<RwLock<Session>>>,
}

impl std::fmt::Debug for SessionTransport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionTransport")
      .field("open", &self.session.is_some())
      .finish()
  }
}

impl SessionTransport {
  fn session(&self) -> Result<Arc<RwLock<Session>>, Fault> {
    self
      .session
      .clone()
      .ok_or_else(|| Fault::Session("session closed".to_owned()))
  }
}

#[async_trait::async_trait]
impl Transport for SessionTransport {
  async fn read(&mut self, node: &NodeAddress) -> Result<Variant, Fault> {
    let session = self.session()?;
    let node_id = node_id(node);

    let values = tokio::task::spawn_blocking(move || {
      let session = session.read();
      AttributeService::read(
        &*session,
        &[ReadValueId {
          node_id,
          attribute_id: AttributeId::Value as u32,
          index_range: UAString::null(),
          data_encoding: QualifiedName::null(),
        }],
        TimestampsToReturn::Neither,
        0.0,
      )
    })
    .await
    .map_err(|error| Fault::Session(error.to_string()))?
    .map_err(status_fault)?;

    let value = values
      .into_iter()
      .next()
      .ok_or_else(|| Fault::Node("empty read response".to_owned()))?;
    if let Some(status) = value.status {
      if !status.is_good() {
        return Err(Fault::Node(status.to_string()));
      }
    }

    Ok(from_ua(value.value.unwrap_or(UaVariant::Empty)))
  }

  async fn write(
    &mut self,
    node: &NodeAddress,
    value: Variant,
  ) -> Result<(), Fault> {
    let session = self.session()?;
    let node_id = node_id(node);
    let value = to_ua(value)?;

    let statuses = tokio::task::spawn_blocking(move || {
      let session = session.read();
      AttributeService::write(
        &*session,
        &[WriteValue {
          node_id,
          attribute_id: AttributeId::Value as u32,
          index_range: UAString::null(),
          value: DataValue::value_only(value),
        }],
      )
    })
    .await
    .map_err(|error| Fault::Session(error.to_string()))?
    .map_err(status_fault)?;

    match statuses.first() {
      Some(status) if status.is_good() => Ok(()),
      Some(status) => Err(Fault::Node(status.to_string())),
      None => Err(Fault::Node("empty write response".to_owned())),
    }
  }

  async fn close(&mut self) {
    if let Some(session) = self.session.take() {
      let _ = tokio::task::spawn_blocking(move || {
        session.write().disconnect();
      })
      .await;
    }
  }
}

// NOTE: the session owns a runtime which must not be dropped on an async
// worker thread
impl Drop for SessionTransport {
  fn drop(&mut self) {
    if let Some(session) = self.session.take() {
      match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
          handle.spawn_blocking(move || session.write().disconnect());
        }
        Err(_) => session.write().disconnect(),
      }
    }
  }
}

fn node_id(node: &NodeAddress) -> NodeId {
  match &node.identifier {
    NodeIdentifier::Numeric(id) => NodeId::new(node.namespace, *id),
    NodeIdentifier::String(id) => NodeId::new(node.namespace, id.clone()),
  }
}

fn connect_error(status: StatusCode) -> ConnectError {
  if status == StatusCode::BadTimeout {
    ConnectError::Timeout
  } else if status == StatusCode::BadConnectionRejected {
    ConnectError::Refused(io::Error::new(
      io::ErrorKind::ConnectionRefused,
      status.to_string(),
    ))
  } else if status == StatusCode::BadCommunicationError
    || status == StatusCode::BadNotConnected
    || status == StatusCode::BadTcpEndpointUrlInvalid
  {
    ConnectError::Unreachable(io::Error::new(
      io::ErrorKind::NotConnected,
      status.to_string(),
    ))
  } else {
    ConnectError::Rejected(status.to_string())
  }
}

fn status_fault(status: StatusCode) -> Fault {
  if status == StatusCode::BadTimeout {
    Fault::Timeout
  } else if status == StatusCode::BadCommunicationError
    || status == StatusCode::BadConnectionClosed
    || status == StatusCode::BadNotConnected
    || status == StatusCode::BadServerNotConnected
    || status == StatusCode::BadSessionClosed
    || status == StatusCode::BadSessionIdInvalid
    || status == StatusCode::BadSecureChannelClosed
  {
    Fault::Session(status.to_string())
  } else {
    Fault::Node(status.to_string())
  }
}

fn from_ua(variant: UaVariant) -> Variant {
  match variant {
    UaVariant::Empty => Variant::Empty,
    UaVariant::Boolean(value) => Variant::Boolean(value),
    UaVariant::SByte(value) => Variant::SByte(value),
    UaVariant::Byte(value) => Variant::Byte(value),
    UaVariant::Int16(value) => Variant::Int16(value),
    UaVariant::UInt16(value) => Variant::UInt16(value),
    UaVariant::Int32(value) => Variant::Int32(value),
    UaVariant::UInt32(value) => Variant::UInt32(value),
    UaVariant::Int64(value) => Variant::Int64(value),
    UaVariant::UInt64(value) => Variant::UInt64(value),
    UaVariant::Float(value) => Variant::Float(value),
    UaVariant::Double(value) => Variant::Double(value),
    UaVariant::String(value) => Variant::String(value.as_ref().to_owned()),
    other => Variant::Other(format!("{other:?}")),
  }
}

fn to_ua(variant: Variant) -> Result<UaVariant, Fault> {
  Ok(match variant {
    Variant::Empty => UaVariant::Empty,
    Variant::Boolean(value) => UaVariant::Boolean(value),
    Variant::SByte(value) => UaVariant::SByte(value),
    Variant::Byte(value) => UaVariant::Byte(value),
    Variant::Int16(value) => UaVariant::Int16(value),
    Variant::UInt16(value) => UaVariant::UInt16(value),
    Variant::Int32(value) => UaVariant::Int32(value),
    Variant::UInt32(value) => UaVariant::UInt32(value),
    Variant::Int64(value) => UaVariant::Int64(value),
    Variant::UInt64(value) => UaVariant::UInt64(value),
    Variant::Float(value) => UaVariant::Float(value),
    Variant::Double(value) => UaVariant::Double(value),
    Variant::String(value) => UaVariant::String(UAString::from(value)),
    Variant::Other(kind) => {
      return Err(Fault::Node(format!("cannot write {kind} values")))
    }
  })
}
