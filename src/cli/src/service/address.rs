use std::fmt::Display;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_modbus::{Address, Quantity};

// NOTE: these grammars are typed in by hand on site - never change them
// without migrating existing tag addresses

static MODBUS_ADDRESS: Lazy<Regex> = Lazy::new(|| {
  #[allow(clippy::unwrap_used)] // NOTE: valid regex
  Regex::new(r"^(?i)(hr|ir|co|di)_(\d+)$").unwrap()
});

static OPCUA_QUALIFIED_ADDRESS: Lazy<Regex> = Lazy::new(|| {
  #[allow(clippy::unwrap_used)] // NOTE: valid regex
  Regex::new(r"^ns=(\d+);(i|s)=(.+)$").unwrap()
});

static OPCUA_BARE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
  #[allow(clippy::unwrap_used)] // NOTE: valid regex
  Regex::new(r"^i=(\d+)$").unwrap()
});

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) enum Protocol {
  OpcUa,
  Modbus,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) enum DataType {
  Bool,
  Int16,
  Int32,
  Float32,
}

/// One of the four standard Modbus data tables.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) enum Table {
  Coils,
  DiscreteInputs,
  InputRegisters,
  HoldingRegisters,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) enum NodeIdentifier {
  Numeric(u32),
  String(String),
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) struct NodeAddress {
  pub(crate) namespace: u16,
  pub(crate) identifier: NodeIdentifier,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub(crate) struct RegisterAddress {
  pub(crate) table: Table,
  pub(crate) offset: Address,
  pub(crate) data_type: DataType,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub(crate) enum ParsedAddress {
  OpcUa {
    node: NodeAddress,
    data_type: DataType,
  },
  Modbus(RegisterAddress),
}

#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub(crate) enum AddressError {
  #[error("Malformed address {address:?}: {reason}")]
  Malformed {
    address: String,
    reason: &'static str,
  },

  #[error("Address {address:?} cannot hold a {data_type} value")]
  TypeMismatch {
    address: String,
    data_type: DataType,
  },
}

#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Unknown {kind} {value:?}")]
pub(crate) struct UnknownVariantError {
  kind: &'static str,
  value: String,
}

pub(crate) fn parse(
  protocol: Protocol,
  address: &str,
  data_type: DataType,
) -> Result<ParsedAddress, AddressError> {
  match protocol {
    Protocol::OpcUa => Ok(ParsedAddress::OpcUa {
      node: parse_node(address)?,
      data_type,
    }),
    Protocol::Modbus => {
      Ok(ParsedAddress::Modbus(parse_register(address, data_type)?))
    }
  }
}

fn parse_node(address: &str) -> Result<NodeAddress, AddressError> {
  if let Some(captures) = OPCUA_BARE_ADDRESS.captures(address) {
    let identifier = captures[1]
      .parse::<u32>()
      .map_err(|_| malformed(address, "numeric identifier out of range"))?;

    return Ok(NodeAddress {
      namespace: 0,
      identifier: NodeIdentifier::Numeric(identifier),
    });
  }

  let captures = match OPCUA_QUALIFIED_ADDRESS.captures(address) {
    Some(captures) => captures,
    None => {
      return Err(malformed(
        address,
        "expected ns=<int>;s=<string>, ns=<int>;i=<int> or i=<int>",
      ))
    }
  };

  let namespace = captures[1]
    .parse::<u16>()
    .map_err(|_| malformed(address, "namespace out of range"))?;

  let identifier = match &captures[2] {
    "i" => NodeIdentifier::Numeric(
      captures[3]
        .parse::<u32>()
        .map_err(|_| malformed(address, "invalid numeric identifier"))?,
    ),
    _ => NodeIdentifier::String(captures[3].to_owned()),
  };

  Ok(NodeAddress {
    namespace,
    identifier,
  })
}

fn parse_register(
  address: &str,
  data_type: DataType,
) -> Result<RegisterAddress, AddressError> {
  let captures = match MODBUS_ADDRESS.captures(address) {
    Some(captures) => captures,
    None => {
      return Err(malformed(address, "expected hr_N, ir_N, co_N or di_N"))
    }
  };

  let table = match captures[1].to_ascii_lowercase().as_str() {
    "hr" => Table::HoldingRegisters,
    "ir" => Table::InputRegisters,
    "co" => Table::Coils,
    _ => Table::DiscreteInputs,
  };

  let offset = captures[2]
    .parse::<Address>()
    .map_err(|_| malformed(address, "offset out of range"))?;

  let compatible = match table {
    Table::Coils | Table::DiscreteInputs => data_type == DataType::Bool,
    Table::InputRegisters | Table::HoldingRegisters => {
      data_type != DataType::Bool
    }
  };
  if !compatible {
    return Err(AddressError::TypeMismatch {
      address: address.to_owned(),
      data_type,
    });
  }

  let register = RegisterAddress {
    table,
    offset,
    data_type,
  };
  if u32::from(offset) + u32::from(register.quantity()) > 1 << 16 {
    return Err(malformed(address, "register span exceeds address space"));
  }

  Ok(register)
}

fn malformed(address: &str, reason: &'static str) -> AddressError {
  AddressError::Malformed {
    address: address.to_owned(),
    reason,
  }
}

impl RegisterAddress {
  /// Number of bits or registers one read of this address spans.
  pub(crate) fn quantity(&self) -> Quantity {
    match self.data_type {
      DataType::Bool | DataType::Int16 => 1,
      DataType::Int32 | DataType::Float32 => 2,
    }
  }

  pub(crate) fn writable(&self) -> bool {
    matches!(self.table, Table::Coils | Table::HoldingRegisters)
  }
}

impl ParsedAddress {
  pub(crate) fn data_type(&self) -> DataType {
    match self {
      ParsedAddress::OpcUa { data_type, .. } => *data_type,
      ParsedAddress::Modbus(register) => register.data_type,
    }
  }
}

impl FromStr for Protocol {
  type Err = UnknownVariantError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.to_ascii_lowercase().as_str() {
      "opcua" | "opc-ua" => Ok(Protocol::OpcUa),
      "modbus" => Ok(Protocol::Modbus),
      _ => Err(UnknownVariantError {
        kind: "protocol",
        value: value.to_owned(),
      }),
    }
  }
}

impl Display for Protocol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Protocol::OpcUa => write!(f, "opcua"),
      Protocol::Modbus => write!(f, "modbus"),
    }
  }
}

impl FromStr for DataType {
  type Err = UnknownVariantError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.to_ascii_lowercase().as_str() {
      "bool" => Ok(DataType::Bool),
      "int" | "int16" => Ok(DataType::Int16),
      "int32" => Ok(DataType::Int32),
      "float" | "float32" => Ok(DataType::Float32),
      _ => Err(UnknownVariantError {
        kind: "data type",
        value: value.to_owned(),
      }),
    }
  }
}

impl Display for DataType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DataType::Bool => write!(f, "bool"),
      DataType::Int16 => write!(f, "int16"),
      DataType::Int32 => write!(f, "int32"),
      DataType::Float32 => write!(f, "float32"),
    }
  }
}

impl Display for NodeAddress {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.identifier {
      NodeIdentifier::Numeric(id) => {
        write!(f, "ns={};i={}", self.namespace, id)
      }
      NodeIdentifier::String(id) => {
        write!(f, "ns={};s={}", self.namespace, id)
      }
    }
  }
}
