#![deny(
  unsafe_code,
  // reason = "Let's just not do it"
)]
#![deny(
  clippy::unwrap_used,
  clippy::expect_used,
  clippy::panic,
  clippy::unreachable,
  // reason = "We have to handle errors properly"
)]

mod config;
mod process;
mod service;

use config::args::Command;
use service::address::{self, DataType, Protocol};
use service::model::Value;
use service::store::ConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let args = config::args::parse();

  // NOTE: checking an address needs neither env nor database
  if let Some(Command::Check {
    protocol,
    data_type,
    address,
  }) = &args.command
  {
    return check(protocol, data_type, address);
  }

  let command = args.command.clone().unwrap_or(Command::Run);
  let config = config::Manager::new(args).await?;
  let values = config.values();

  let filter = tracing_subscriber::EnvFilter::builder()
    .with_default_directive(values.log_level.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let services = service::Container::new(values.clone());
  services.db().migrate().await?;

  match command {
    Command::Run => {
      tracing::info!(
        "Polling every {}ms",
        values.poll_interval.num_milliseconds()
      );
      let processes = process::Container::new(values, services.clone());

      processes.spawn().await;
      tokio::signal::ctrl_c().await?;
      tracing::info!("Shutting down");
      processes.cancel().await;
    }
    Command::Poll { device } => {
      for reading in services.poller().poll_now(device).await? {
        match (&reading.measurement.value, &reading.error) {
          (Some(value), _) => println!("{}\t{}", reading.tag.name, value),
          (None, Some(error)) => {
            println!("{}\tbad ({})", reading.tag.name, error)
          }
          (None, None) => println!("{}\tbad", reading.tag.name),
        }
      }
    }
    Command::Write { device, tag, value } => {
      let data_type = services
        .db()
        .get_device(device)
        .await?
        .and_then(|device| {
          device
            .tags
            .into_iter()
            .find(|candidate| candidate.id == tag)
            .map(|tag| tag.data_type)
        })
        .ok_or_else(|| {
          anyhow::anyhow!("Tag {} not found on device {}", tag, device)
        })?;
      let value = Value::parse(data_type, &value)?;
      services.poller().write_tag(device, tag, value).await?;
      println!("Wrote {}", value);
    }
    Command::Check { .. } => {}
  }

  services.pool().shutdown().await;

  Ok(())
}

fn check(protocol: &str, data_type: &str, raw: &str) -> anyhow::Result<()> {
  let protocol = protocol.parse::<Protocol>()?;
  let data_type = data_type.parse::<DataType>()?;

  match address::parse(protocol, raw, data_type)? {
    address::ParsedAddress::OpcUa { node, data_type } => {
      println!("{} node {} as {}", protocol, node, data_type);
    }
    address::ParsedAddress::Modbus(register) => {
      println!(
        "{} {:?} offset {} as {}{}",
        protocol,
        register.table,
        register.offset,
        register.data_type,
        if register.writable() { "" } else { " (read only)" }
      );
    }
  }

  Ok(())
}
