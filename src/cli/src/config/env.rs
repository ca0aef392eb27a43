const PREFIX: &str = "KOLEKTOR";

#[derive(Debug, Clone)]
pub(crate) struct Db {
  pub(crate) ssl: bool,
  pub(crate) domain: String,
  pub(crate) port: Option<String>,
  pub(crate) user: String,
  pub(crate) password: Option<String>,
  pub(crate) name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Values {
  pub(crate) db: Db,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
  #[error("Failed reading env var {name}")]
  EnvVarRead {
    name: String,
    #[source]
    source: std::env::VarError,
  },
}

pub(crate) fn parse() -> Result<Values, ParseError> {
  let _ = dotenv::dotenv();

  let values = Values {
    db: Db {
      ssl: flag("DB_SSL"),
      domain: required("DB_DOMAIN")?,
      port: optional("DB_PORT"),
      user: required("DB_USER")?,
      password: optional("DB_PASSWORD"),
      name: required("DB_NAME")?,
    },
  };

  Ok(values)
}

fn required(key: &str) -> Result<String, ParseError> {
  let name = format!("{PREFIX}_{key}");
  std::env::var(&name).map_err(|source| ParseError::EnvVarRead { name, source })
}

fn optional(key: &str) -> Option<String> {
  std::env::var(format!("{PREFIX}_{key}")).ok()
}

// NOTE: set means on, whatever the value
fn flag(key: &str) -> bool {
  std::env::var_os(format!("{PREFIX}_{key}")).is_some()
}
