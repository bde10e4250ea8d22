// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validated host/port pairs for API server addresses.
//!
//! A [`HostPort`] always holds either an IP address or an RFC 1123 DNS name and
//! a non-zero port. It serializes as `host:port`, with IPv6 hosts bracketed.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::HostPortError;

/// Maximum length of a DNS name
const MAX_DNS_NAME_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_DNS_LABEL_LEN: usize = 63;

/// A validated network address consisting of a host and a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    /// Creates a new `HostPort` from a host and a port.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is neither an IP address nor a DNS name,
    /// or if the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, HostPortError> {
        let host = host.into();
        if host.parse::<IpAddr>().is_err() && !is_dns_name(&host) {
            return Err(HostPortError::InvalidHost);
        }
        if port == 0 {
            return Err(HostPortError::ZeroPort);
        }
        Ok(Self { host, port })
    }

    /// Parses a `host:port` string. IPv6 hosts must be bracketed.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is missing or invalid, or if the host is invalid.
    pub fn parse(s: &str) -> Result<Self, HostPortError> {
        let (host, port) = split_host_port(s)?;
        let port = parse_port(port)?;
        Self::new(host, port)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for HostPort {
    type Err = HostPortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for HostPort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostPort {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn split_host_port(s: &str) -> Result<(&str, &str), HostPortError> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| HostPortError::InvalidAddress(s.to_string()))?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, port)),
            None if after.is_empty() => Err(HostPortError::MissingPort),
            None => Err(HostPortError::InvalidAddress(s.to_string())),
        };
    }

    match s.rsplit_once(':') {
        None => Err(HostPortError::MissingPort),
        Some((host, _)) if host.contains(':') => Err(HostPortError::InvalidAddress(s.to_string())),
        Some((host, port)) => Ok((host, port)),
    }
}

fn parse_port(s: &str) -> Result<u16, HostPortError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HostPortError::InvalidPort(s.to_string()));
    }
    let port: u64 = s
        .parse()
        .map_err(|_| HostPortError::InvalidPort(s.to_string()))?;
    if port == 0 {
        return Err(HostPortError::ZeroPort);
    }
    u16::try_from(port).map_err(|_| HostPortError::PortOutOfRange(port))
}

/// Checks whether `s` is an RFC 1123 DNS name. A single trailing dot is accepted.
#[must_use]
pub fn is_dns_name(s: &str) -> bool {
    let name = s.strip_suffix('.').unwrap_or(s);
    if name.is_empty() || name.len() > MAX_DNS_NAME_LEN {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_DNS_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

#[cfg(test)]
#[path = "host_port_tests.rs"]
mod host_port_tests;
