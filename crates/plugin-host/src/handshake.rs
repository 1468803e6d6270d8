// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handshake line parsing.
//!
//! A plugin announces where it listens by writing one line to stdout:
//!
//! * `host:port`: TCP; `host` may be empty (`:1234`), a name, an IPv4
//!   literal or a bracketed IPv6 literal.
//! * `network|address`: explicit network, `tcp` or `unix`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transport a plugin address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// TCP `host:port`.
    Tcp,
    /// Unix domain socket path.
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        })
    }
}

/// A dialable endpoint advertised by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginAddress {
    /// Transport.
    pub network: Network,
    /// Address exactly as advertised, without the network prefix.
    pub address: String,
}

impl PluginAddress {
    /// Parse a handshake line. Surrounding whitespace (including `\r\n`) is
    /// ignored.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(HandshakeError::Empty);
        }

        let (network, address) = match line.split_once('|') {
            Some((net, addr)) => {
                let network = match net.trim() {
                    "tcp" => Network::Tcp,
                    "unix" => Network::Unix,
                    other => return Err(HandshakeError::UnknownNetwork(other.to_string())),
                };
                (network, addr.trim())
            }
            None => (Network::Tcp, line),
        };

        if address.is_empty() {
            return Err(HandshakeError::EmptyAddress);
        }
        if network == Network::Tcp {
            validate_tcp(address)?;
        }

        Ok(Self {
            network,
            address: address.to_string(),
        })
    }

    /// The TCP port, if this is a TCP address.
    pub fn port(&self) -> Option<u16> {
        match self.network {
            Network::Tcp => self
                .address
                .rsplit_once(':')
                .and_then(|(_, p)| p.parse().ok()),
            Network::Unix => None,
        }
    }
}

impl FromStr for PluginAddress {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PluginAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Why a handshake line could not be turned into an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The line was blank.
    #[error("handshake line is empty")]
    Empty,
    /// A `network|` prefix named an unsupported transport.
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),
    /// Nothing followed the `network|` prefix.
    #[error("address is empty")]
    EmptyAddress,
    /// A TCP address had no `:port` suffix.
    #[error("missing port in address '{0}'")]
    MissingPort(String),
    /// The port was not a number in `1..=65535`.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    /// The host part contained characters no host name or literal allows.
    #[error("invalid host '{0}'")]
    InvalidHost(String),
}

fn validate_tcp(address: &str) -> Result<(), HandshakeError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| HandshakeError::MissingPort(address.to_string()))?;

    match port.parse::<u16>() {
        Ok(p) if p != 0 && port.bytes().all(|b| b.is_ascii_digit()) => {}
        _ => return Err(HandshakeError::InvalidPort(port.to_string())),
    }

    let bare = if let Some(inner) = host.strip_prefix('[') {
        inner
            .strip_suffix(']')
            .ok_or_else(|| HandshakeError::InvalidHost(host.to_string()))?
    } else if host.contains(':') {
        // Unbracketed IPv6 literals are ambiguous with the port separator.
        return Err(HandshakeError::InvalidHost(host.to_string()));
    } else {
        host
    };

    let host_ok = bare
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'));
    if !host_ok {
        return Err(HandshakeError::InvalidHost(host.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port() {
        let addr = PluginAddress::parse(":1234\n").unwrap();
        assert_eq!(addr.network, Network::Tcp);
        assert_eq!(addr.to_string(), ":1234");
        assert_eq!(addr.port(), Some(1234));
    }

    #[test]
    fn host_and_port() {
        let addr: PluginAddress = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(addr.address, "127.0.0.1:8080");
        assert_eq!(addr.port(), Some(8080));

        let addr = PluginAddress::parse("localhost:9\r\n").unwrap();
        assert_eq!(addr.address, "localhost:9");
    }

    #[test]
    fn bracketed_ipv6() {
        let addr = PluginAddress::parse("[::1]:4000").unwrap();
        assert_eq!(addr.address, "[::1]:4000");
        assert_eq!(addr.port(), Some(4000));
    }

    #[test]
    fn unbracketed_ipv6_rejected() {
        assert!(matches!(
            PluginAddress::parse("::1:4000"),
            Err(HandshakeError::InvalidHost(_))
        ));
    }

    #[test]
    fn explicit_networks() {
        let addr = PluginAddress::parse("unix|/tmp/plugin.sock").unwrap();
        assert_eq!(addr.network, Network::Unix);
        assert_eq!(addr.address, "/tmp/plugin.sock");
        assert_eq!(addr.port(), None);

        let addr = PluginAddress::parse("tcp|:1234").unwrap();
        assert_eq!(addr.network, Network::Tcp);
        assert_eq!(addr.address, ":1234");
    }

    #[test]
    fn malformed_lines() {
        assert_eq!(PluginAddress::parse("   \n"), Err(HandshakeError::Empty));
        assert_eq!(
            PluginAddress::parse("1234"),
            Err(HandshakeError::MissingPort("1234".into()))
        );
        assert_eq!(
            PluginAddress::parse(":http"),
            Err(HandshakeError::InvalidPort("http".into()))
        );
        assert_eq!(
            PluginAddress::parse(":0"),
            Err(HandshakeError::InvalidPort("0".into()))
        );
        assert_eq!(
            PluginAddress::parse(":+80"),
            Err(HandshakeError::InvalidPort("+80".into()))
        );
        assert_eq!(
            PluginAddress::parse(":70000"),
            Err(HandshakeError::InvalidPort("70000".into()))
        );
        assert_eq!(
            PluginAddress::parse("udp|:53"),
            Err(HandshakeError::UnknownNetwork("udp".into()))
        );
        assert_eq!(PluginAddress::parse("unix|"), Err(HandshakeError::EmptyAddress));
        assert!(matches!(
            PluginAddress::parse("bad host:80"),
            Err(HandshakeError::InvalidHost(_))
        ));
    }
}
