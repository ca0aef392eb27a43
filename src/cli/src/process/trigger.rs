use crate::service::model::DeviceId;
use crate::*;

/// Turns database notifications into manual poll requests.
///
/// The payload of a notification is the id of the device to poll.
pub(crate) struct Process {
  config: config::Values,
  services: service::Container,
  sender: flume::Sender<DeviceId>,
}

impl Process {
  pub(crate) fn new(
    config: config::Values,
    services: service::Container,
    sender: flume::Sender<DeviceId>,
  ) -> Self {
    Self {
      config,
      services,
      sender,
    }
  }
}

impl super::Process for Process {}

#[async_trait::async_trait]
impl super::Continuous for Process {
  #[tracing::instrument(
    skip(self),
    fields(channel = %self.config.trigger.channel)
  )]
  async fn run(&self) -> anyhow::Result<()> {
    let mut listener =
      self.services.db().listen(&self.config.trigger.channel).await?;

    loop {
      let notification = listener.recv().await?;
      match parse_payload(notification.payload()) {
        Some(device) => {
          tracing::debug!("Poll of device {} requested", device);
          self.sender.send_async(device).await?;
        }
        None => {
          tracing::warn!(
            "Ignoring poll request with payload {:?}",
            notification.payload()
          );
        }
      }
    }
  }
}

fn parse_payload(payload: &str) -> Option<DeviceId> {
  payload.trim().parse::<DeviceId>().ok()
}
