use crate::service::model::{DeviceId, TagId};

#[derive(Debug, Clone, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Values {
  /// Alternative configuration location
  #[arg(short, long)]
  pub(crate) config: Option<String>,

  /// Log everything regardless of the configured level
  #[arg(short, long)]
  pub(crate) trace: bool,

  #[command(subcommand)]
  pub(crate) command: Option<Command>,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub(crate) enum Command {
  /// Poll every enabled device on the configured interval (default)
  Run,

  /// Poll one device once and print its readings
  Poll { device: DeviceId },

  /// Write one value to a tag
  Write {
    device: DeviceId,
    tag: TagId,
    value: String,
  },

  /// Check an address against the grammar of its protocol
  Check {
    protocol: String,
    data_type: String,
    address: String,
  },
}

pub(crate) fn parse() -> Values {
  clap::Parser::parse()
}
