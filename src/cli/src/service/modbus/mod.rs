mod client;
mod connection;
mod encoding;

pub(crate) use client::Client;
pub(crate) use connection::{Destination, Dial, TcpDial};
#[cfg(test)]
pub(crate) use connection::Transport;
