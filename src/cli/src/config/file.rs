use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Db {
  pub(crate) timeout: Option<u32>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Acquisition {
  pub(crate) connect_timeout: Option<u32>,
  pub(crate) read_timeout: Option<u32>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OpcUa {
  pub(crate) application_name: Option<String>,
  pub(crate) application_uri: Option<String>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Trigger {
  pub(crate) channel: Option<String>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Values {
  pub(crate) log_level: Option<LogLevel>,
  pub(crate) poll_interval: Option<u32>,
  pub(crate) termination_timeout: Option<u32>,
  #[serde(default)]
  pub(crate) db: Db,
  #[serde(default)]
  pub(crate) acquisition: Acquisition,
  #[serde(default)]
  pub(crate) opcua: OpcUa,
  #[serde(default)]
  pub(crate) trigger: Trigger,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed reading config file")]
  Read(#[from] std::io::Error),

  #[error("Config file is missing an extension")]
  MissingExtension,

  #[error("Config file has invalid extension")]
  InvalidExtension,

  #[error("Failed deserializing config from yaml")]
  DeserializetionYaml(#[from] serde_yaml::Error),

  #[error("Failed deserializing config from toml")]
  DeserializetionToml(#[from] toml::de::Error),

  #[error("Failed deserializing config from json")]
  DeserializetionJson(#[from] serde_json::Error),
}

/// Reads the config file given on the command line, or the one in the
/// project config directory when it exists.
pub(crate) async fn parse_file(
  location: Option<&str>,
) -> Result<Values, ParseError> {
  let location = match location {
    Some(location) => PathBuf::from(location),
    None => {
      let location =
        directories::ProjectDirs::from("com", "kolektor", "kolektor")
          .map(|project_dirs| project_dirs.config_dir().join("config.yaml"));
      let location = match location {
        Some(location) => location,
        None => return Ok(Values::default()),
      };
      if !tokio::fs::try_exists(&location).await? {
        tracing::debug!("No config file at {:?}, using defaults", location);
        return Ok(Values::default());
      }
      location
    }
  };

  let raw = tokio::fs::read_to_string(&location).await?;
  parse_str(&raw, location.extension().and_then(|str| str.to_str()))
}

fn parse_str(raw: &str, extension: Option<&str>) -> Result<Values, ParseError> {
  let values = match extension {
    None => return Err(ParseError::MissingExtension),
    Some("yaml" | "yml") => serde_yaml::from_str::<Values>(raw)?,
    Some("toml") => toml::from_str::<Values>(raw)?,
    Some("json") => serde_json::from_str::<Values>(raw)?,
    Some(_) => return Err(ParseError::InvalidExtension),
  };

  Ok(values)
}

pub(crate) fn milliseconds_to_chrono(milliseconds: u32) -> chrono::Duration {
  chrono::Duration::milliseconds(milliseconds as i64)
}
