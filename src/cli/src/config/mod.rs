pub(crate) mod args;
mod env;
mod file;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Db {
  pub(crate) timeout: chrono::Duration,
  pub(crate) ssl: bool,
  pub(crate) domain: String,
  pub(crate) port: Option<u16>,
  pub(crate) user: String,
  pub(crate) password: Option<String>,
  pub(crate) name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Acquisition {
  pub(crate) connect_timeout: chrono::Duration,
  pub(crate) read_timeout: chrono::Duration,
}

#[derive(Debug, Clone)]
pub(crate) struct OpcUa {
  #[cfg_attr(not(feature = "opcua"), allow(dead_code))]
  pub(crate) application_name: String,
  #[cfg_attr(not(feature = "opcua"), allow(dead_code))]
  pub(crate) application_uri: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Trigger {
  pub(crate) channel: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Values {
  pub(crate) log_level: tracing::level_filters::LevelFilter,
  pub(crate) poll_interval: chrono::Duration,
  pub(crate) termination_timeout: chrono::Duration,
  pub(crate) db: Db,
  pub(crate) acquisition: Acquisition,
  pub(crate) opcua: OpcUa,
  pub(crate) trigger: Trigger,
}

#[derive(Debug, Clone)]
struct Unparsed {
  from_args: args::Values,
  from_env: env::Values,
  from_file: file::Values,
}

#[derive(Debug, Clone)]
pub(crate) struct Manager {
  unparsed: Unparsed,
}

#[derive(Debug, Error)]
pub(crate) enum ReadError {
  #[error("Failed reading file")]
  FileReadError(#[from] file::ParseError),

  #[error("Failed reading env")]
  EnvReadError(#[from] env::ParseError),
}

impl Manager {
  pub(crate) async fn new(from_args: args::Values) -> Result<Self, ReadError> {
    let from_env = env::parse()?;
    let from_file = file::parse_file(from_args.config.as_deref()).await?;

    Ok(Self {
      unparsed: Unparsed {
        from_args,
        from_env,
        from_file,
      },
    })
  }

  pub(crate) fn values(&self) -> Values {
    Self::parse(self.unparsed.clone())
  }

  fn parse(config: Unparsed) -> Values {
    Values {
      log_level: log_level(config.from_args.trace, config.from_file.log_level),
      // NOTE: a zero period would make the interval timer panic
      poll_interval: file::milliseconds_to_chrono(
        config.from_file.poll_interval.unwrap_or(5000).max(1),
      ),
      termination_timeout: file::milliseconds_to_chrono(
        config.from_file.termination_timeout.unwrap_or(10_000),
      ),
      db: Db {
        timeout: file::milliseconds_to_chrono(
          config.from_file.db.timeout.unwrap_or(30000),
        ),
        ssl: config.from_env.db.ssl,
        domain: config.from_env.db.domain,
        port: config
          .from_env
          .db
          .port
          .and_then(|port| port.parse::<u16>().ok()),
        user: config.from_env.db.user,
        password: config.from_env.db.password,
        name: config.from_env.db.name,
      },
      acquisition: Acquisition {
        connect_timeout: file::milliseconds_to_chrono(
          config.from_file.acquisition.connect_timeout.unwrap_or(3000),
        ),
        read_timeout: file::milliseconds_to_chrono(
          config.from_file.acquisition.read_timeout.unwrap_or(3000),
        ),
      },
      opcua: OpcUa {
        application_name: config
          .from_file
          .opcua
          .application_name
          .unwrap_or_else(|| "Kolektor".to_owned()),
        application_uri: config
          .from_file
          .opcua
          .application_uri
          .unwrap_or_else(|| "urn:kolektor".to_owned()),
      },
      trigger: Trigger {
        channel: config
          .from_file
          .trigger
          .channel
          .unwrap_or_else(|| "kolektor_poll".to_owned()),
      },
    }
  }
}

fn log_level(
  trace: bool,
  configured: Option<file::LogLevel>,
) -> tracing::level_filters::LevelFilter {
  if trace {
    return tracing::level_filters::LevelFilter::TRACE;
  }

  match configured {
    Some(file::LogLevel::Trace) => tracing::level_filters::LevelFilter::TRACE,
    Some(file::LogLevel::Debug) => tracing::level_filters::LevelFilter::DEBUG,
    Some(file::LogLevel::Info) => tracing::level_filters::LevelFilter::INFO,
    Some(file::LogLevel::Warn) => tracing::level_filters::LevelFilter::WARN,
    Some(file::LogLevel::Error) => tracing::level_filters::LevelFilter::ERROR,
    #[cfg(debug_assertions)]
    None => tracing::level_filters::LevelFilter::DEBUG,
    #[cfg(not(debug_assertions))]
    None => tracing::level_filters::LevelFilter::INFO,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn unparsed(from_file: file::Values) -> Unparsed {
    Unparsed {
      from_args: args::Values {
        config: None,
        trace: false,
        command: None,
      },
      from_env: env::Values {
        db: env::Db {
          ssl: false,
          domain: "localhost".to_owned(),
          port: Some("5433".to_owned()),
          user: "kolektor".to_owned(),
          password: None,
          name: "kolektor".to_owned(),
        },
      },
      from_file,
    }
  }

  #[test]
  fn fills_in_defaults() {
    let values = Manager::parse(unparsed(file::Values::default()));

    assert_eq!(values.poll_interval, chrono::Duration::seconds(5));
    assert_eq!(values.acquisition.read_timeout, chrono::Duration::seconds(3));
    assert_eq!(values.termination_timeout, chrono::Duration::seconds(10));
    assert_eq!(values.trigger.channel, "kolektor_poll");
    assert_eq!(values.db.port, Some(5433));
  }

  #[test]
  fn file_values_win_and_zero_interval_is_clamped() {
    let values = Manager::parse(unparsed(file::Values {
      poll_interval: Some(0),
      log_level: Some(file::LogLevel::Warn),
      ..file::Values::default()
    }));

    assert_eq!(values.poll_interval, chrono::Duration::milliseconds(1));
    assert_eq!(values.log_level, tracing::level_filters::LevelFilter::WARN);
  }
}
