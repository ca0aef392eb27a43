mod manual;
mod poll;
mod trigger;

use std::sync::Arc;

use futures_time::future::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::*;

pub(crate) trait Process {
  fn process_name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }
}

/// Runs once per tick of its interval.
#[async_trait::async_trait]
pub(crate) trait Recurring: Process {
  async fn execute(&self) -> anyhow::Result<()>;
}

/// Runs until cancelled and gets restarted when it fails.
#[async_trait::async_trait]
pub(crate) trait Continuous: Process {
  async fn run(&self) -> anyhow::Result<()>;
}

pub(crate) struct Container {
  config: config::Values,
  services: service::Container,
  tracker: TaskTracker,
  handles: Arc<Mutex<Option<Vec<Handle>>>>,
}

impl Container {
  pub(crate) fn new(
    config: config::Values,
    services: service::Container,
  ) -> Self {
    Self {
      config,
      services,
      tracker: TaskTracker::new(),
      handles: Arc::new(Mutex::new(None)),
    }
  }

  pub(crate) async fn spawn(&self) {
    let (sender, receiver) = flume::bounded(TRIGGER_CAPACITY);

    let handles = vec![
      Handle::recurring(
        Box::new(poll::Process::new(
          self.services.clone(),
          self.tracker.clone(),
        )),
        self.config.poll_interval,
      ),
      Handle::continuous(Box::new(trigger::Process::new(
        self.config.clone(),
        self.services.clone(),
        sender,
      ))),
      Handle::continuous(Box::new(manual::Process::new(
        self.services.clone(),
        self.tracker.clone(),
        receiver,
      ))),
    ];

    {
      let mut current = self.handles.clone().lock_owned().await;
      *current = Some(handles);
    }
  }

  /// Stops every process and waits for in-flight polls up to the
  /// termination timeout.
  pub(crate) async fn cancel(&self) {
    {
      let mut handles = self.handles.clone().lock_owned().await;
      if let Some(handles) = &mut *handles {
        for handle in handles.iter() {
          handle.token.cancel();
        }

        for handle in handles.drain(0..) {
          if let Err(error) = handle.join.await {
            tracing::error! {
              %error,
              "Joining process handle on cancel failed"
            }
          }
        }
      }
      *handles = None;
    }

    self.tracker.close();
    let timeout = futures_time::time::Duration::from_millis(
      self.config.termination_timeout.num_milliseconds().max(0) as u64,
    );
    if self.tracker.wait().timeout(timeout).await.is_err() {
      tracing::warn!(
        "{} polls still running after termination timeout",
        self.tracker.len()
      );
    }
  }
}

struct Handle {
  token: CancellationToken,
  join: tokio::task::JoinHandle<()>,
}

// NOTE: the listener waits for room once this many requests are queued
const TRIGGER_CAPACITY: usize = 64;

// NOTE: pause before restarting a failed continuous process
const RESTART_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

impl Handle {
  fn recurring(
    process: Box<dyn Recurring + Sync + Send>,
    interval: chrono::Duration,
  ) -> Self {
    let token = CancellationToken::new();
    let child_token = token.child_token();
    let join = tokio::spawn(async move {
      let mut interval = tokio::time::interval(std::time::Duration::from_millis(
        interval.num_milliseconds().max(1) as u64,
      ));
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = child_token.cancelled() => { return; },
          _ = interval.tick() => {
            if let Err(error) = process.execute().await {
              tracing::error!(
                "Process execution failed {} for {}",
                error,
                process.process_name()
              );
            }
          }
        }
      }
    });
    Self { token, join }
  }

  fn continuous(process: Box<dyn Continuous + Sync + Send>) -> Self {
    let token = CancellationToken::new();
    let child_token = token.child_token();
    let join = tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = child_token.cancelled() => { return; },
          result = process.run() => {
            match result {
              Ok(()) => {
                tracing::debug!("Process {} finished", process.process_name());
                return;
              }
              Err(error) => {
                tracing::error!(
                  "Process run failed {} for {}",
                  error,
                  process.process_name()
                );
              }
            }
          }
        }

        tokio::select! {
          _ = child_token.cancelled() => { return; },
          _ = tokio::time::sleep(RESTART_DELAY) => { }
        }
      }
    });
    Self { token, join }
  }
}
