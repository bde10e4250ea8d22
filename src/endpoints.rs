// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! API server address extraction from the `default/kubernetes` Endpoints object.
//!
//! Every subset contributes the cross product of its addresses and its TCP
//! ports named `https`. Problems with individual subsets, ports or addresses
//! are collected as warnings. Extraction only fails when nothing usable is
//! left, so that an empty address list is never published to workers.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints};

use crate::constants::{HTTPS_PORT_NAME, TCP_PROTOCOL};
use crate::errors::{EndpointError, FieldWarning};
use crate::host_port::HostPort;

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedApiServers {
    /// Deduplicated API server addresses, in discovery order
    pub api_servers: Vec<HostPort>,
    /// Problems that were skipped over
    pub warnings: Vec<FieldWarning>,
}

/// Extracts the API server addresses from an Endpoints object.
///
/// # Errors
///
/// Returns [`EndpointError::NoApiServers`] carrying all warnings if no usable
/// address was found.
pub fn extract_api_server_addresses(
    endpoints: &Endpoints,
) -> Result<ExtractedApiServers, EndpointError> {
    let mut warnings = Vec::new();
    let mut api_servers = Vec::new();
    let mut seen = HashSet::new();

    for (s_idx, subset) in endpoints.subsets.iter().flatten().enumerate() {
        let ports = https_ports(s_idx, subset, &mut warnings);
        if ports.is_empty() {
            warnings.push(FieldWarning::new(
                format!("subsets[{s_idx}]"),
                "no suitable TCP/https ports found",
            ));
            continue;
        }

        for (a_idx, address) in subset.addresses.iter().flatten().enumerate() {
            let host = if address.ip.is_empty() {
                address.hostname.as_deref().unwrap_or_default()
            } else {
                address.ip.as_str()
            };
            if host.is_empty() {
                warnings.push(FieldWarning::new(
                    format!("subsets[{s_idx}].addresses[{a_idx}]"),
                    "neither ip nor hostname specified",
                ));
                continue;
            }

            for &port in &ports {
                match HostPort::new(host, port) {
                    Ok(api_server) => {
                        if seen.insert(api_server.clone()) {
                            api_servers.push(api_server);
                        }
                    }
                    Err(e) => warnings.push(FieldWarning::new(format!("{host}:{port}"), e.to_string())),
                }
            }
        }
    }

    if api_servers.is_empty() {
        return Err(EndpointError::NoApiServers { warnings });
    }

    Ok(ExtractedApiServers {
        api_servers,
        warnings,
    })
}

fn https_ports(s_idx: usize, subset: &EndpointSubset, warnings: &mut Vec<FieldWarning>) -> Vec<u16> {
    let mut ports = Vec::new();
    for (p_idx, port) in subset.ports.iter().flatten().enumerate() {
        // Kubernetes defaults an unset protocol to TCP.
        let protocol = port.protocol.as_deref().unwrap_or(TCP_PROTOCOL);
        if protocol != TCP_PROTOCOL || port.name.as_deref() != Some(HTTPS_PORT_NAME) {
            continue;
        }

        match u16::try_from(port.port) {
            Ok(number) => ports.push(number),
            Err(_) => warnings.push(FieldWarning::new(
                format!("subsets[{s_idx}].ports[{p_idx}].port"),
                format!("Invalid value: {}: out of range", port.port),
            )),
        }
    }
    ports
}

#[cfg(test)]
#[path = "endpoints_tests.rs"]
mod endpoints_tests;
