use tokio_util::task::TaskTracker;

use crate::*;

/// Starts one acquisition pass per tick.
///
/// Passes are spawned rather than awaited so a slow device never delays the
/// cadence; a pass still running when the next tick fires overlaps with it.
pub(crate) struct Process {
  services: service::Container,
  tracker: TaskTracker,
}

impl Process {
  pub(crate) fn new(
    services: service::Container,
    tracker: TaskTracker,
  ) -> Self {
    Self { services, tracker }
  }
}

impl super::Process for Process {}

#[async_trait::async_trait]
impl super::Recurring for Process {
  #[tracing::instrument(skip(self))]
  async fn execute(&self) -> anyhow::Result<()> {
    let poller = self.services.poller().clone();
    self.tracker.spawn(async move {
      if let Err(error) = poller.poll_pass().await {
        tracing::error!(%error, "Poll pass failed");
      }
    });

    Ok(())
  }
}
