use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

/// The network context of a node in the service graph.
///
/// Built via [`Endpoint::builder`]; construction normalizes the service name
/// to lower-case and folds IPv4-mapped IPv6 addresses down to IPv4.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Lower-case label of this node, absent when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    /// Port of the IP, absent when unknown. Zero is treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::default()
    }

    /// An endpoint with every field absent serializes as nothing and decodes
    /// back to `None` at the codec boundary.
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.ipv4.is_none()
            && self.ipv6.is_none()
            && self.port.is_none()
    }

    /// Drops the value entirely when it carries no information.
    pub fn filter_empty(self) -> Option<Endpoint> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EndpointBuilder {
    service_name: Option<String>,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    port: Option<u16>,
}

impl EndpointBuilder {
    /// Empty input clears the field; anything else is lower-cased.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.service_name = if name.is_empty() {
            None
        } else {
            Some(name.to_ascii_lowercase())
        };
        self
    }

    /// Parses a textual IP, quietly ignoring input that is not one. Returns
    /// whether the input was accepted so callers can fall back to other
    /// sources of address data.
    pub fn parse_ip(&mut self, ip: &str) -> bool {
        if ip.is_empty() {
            return false;
        }
        match ip.parse::<IpAddr>() {
            Ok(addr) => {
                self.ip_addr(addr);
                true
            }
            Err(_) => false,
        }
    }

    /// Accepts raw address bytes: 4 for IPv4, 16 for IPv6. Other lengths are
    /// ignored rather than rejected, matching the lenient wire contract.
    pub fn parse_ip_bytes(&mut self, bytes: &[u8]) -> bool {
        match bytes.len() {
            4 => {
                let octets: [u8; 4] = bytes.try_into().unwrap();
                self.ip_addr(IpAddr::V4(Ipv4Addr::from(octets)));
                true
            }
            16 => {
                let octets: [u8; 16] = bytes.try_into().unwrap();
                self.ip_addr(IpAddr::V6(Ipv6Addr::from(octets)));
                true
            }
            _ => false,
        }
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.parse_ip(ip);
        self
    }

    pub fn ip_addr(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(v4) => self.ipv4 = Some(v4),
            IpAddr::V6(v6) => {
                // An IPv4-mapped address is really an IPv4 one.
                if let Some(v4) = v6.to_ipv4_mapped() {
                    self.ipv4 = Some(v4);
                } else {
                    self.ipv6 = Some(v6);
                }
            }
        }
    }

    /// Zero means "unknown" on the wire and clears the field.
    pub fn port(mut self, port: u16) -> Self {
        self.port = if port == 0 { None } else { Some(port) };
        self
    }

    pub fn build(self) -> Endpoint {
        Endpoint {
            service_name: self.service_name,
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            port: self.port,
        }
    }
}
