//! Host network address discovery.
//!
//! # Responsibilities
//! - Abstract the control system's ethernet-parameter query
//! - Resolve the current address of adapter 0 exactly once
//! - Reject empty or malformed platform answers
//!
//! # Design Decisions
//! - No retries: the platform answer at call time is authoritative
//! - The address is parsed into `IpAddr` here so nothing downstream re-parses

use std::fmt;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use thiserror::Error;

/// Adapter queried for the current address.
pub const PRIMARY_ADAPTER: u32 = 0;

/// Ethernet parameters the platform can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthernetParameter {
    CurrentIpAddress,
    CurrentSubnetMask,
    CurrentRouter,
    Hostname,
}

/// Embedded platform the host runs on.
pub trait HostPlatform: Send + Sync {
    /// Query a single ethernet parameter for an adapter.
    ///
    /// Returns `None` when the platform has no value to report.
    fn ethernet_parameter(&self, parameter: EthernetParameter, adapter: u32) -> Option<String>;
}

/// Platform that reports a fixed address, taken from configuration.
#[derive(Debug, Clone)]
pub struct StaticPlatform {
    address: Option<String>,
}

impl StaticPlatform {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
        }
    }

    /// A platform with no assigned address.
    pub fn unassigned() -> Self {
        Self { address: None }
    }
}

impl HostPlatform for StaticPlatform {
    fn ethernet_parameter(&self, parameter: EthernetParameter, adapter: u32) -> Option<String> {
        match (parameter, adapter) {
            (EthernetParameter::CurrentIpAddress, PRIMARY_ADAPTER) => self.address.clone(),
            _ => None,
        }
    }
}

/// Platform that asks the OS which local address routes toward a probe target.
///
/// Connecting a UDP socket only selects a route; nothing is transmitted.
#[derive(Debug, Clone)]
pub struct ProbePlatform {
    target: SocketAddr,
}

impl ProbePlatform {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    fn probe(&self) -> std::io::Result<IpAddr> {
        let bind: SocketAddr = if self.target.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(self.target)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl HostPlatform for ProbePlatform {
    fn ethernet_parameter(&self, parameter: EthernetParameter, adapter: u32) -> Option<String> {
        if parameter != EthernetParameter::CurrentIpAddress || adapter != PRIMARY_ADAPTER {
            return None;
        }
        match self.probe() {
            Ok(ip) if !ip.is_unspecified() => Some(ip.to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(probe_target = %self.target, error = %e, "Address probe failed");
                None
            }
        }
    }
}

/// The platform reported no usable address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressUnavailable {
    #[error("platform reported no current IP address for adapter {adapter}")]
    Missing { adapter: u32 },
    #[error("platform reported malformed IP address '{raw}' for adapter {adapter}")]
    Malformed { adapter: u32, raw: String },
}

/// Address assigned to the device for this process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostNetworkAddress(IpAddr);

impl HostNetworkAddress {
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Socket address the listener binds on.
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.0, port)
    }
}

impl fmt::Display for HostNetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for HostNetworkAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>().map(HostNetworkAddress)
    }
}

/// Resolves the device address through a [`HostPlatform`].
pub struct NetworkAddressResolver<'a> {
    platform: &'a dyn HostPlatform,
}

impl<'a> NetworkAddressResolver<'a> {
    pub fn new(platform: &'a dyn HostPlatform) -> Self {
        Self { platform }
    }

    /// Query the platform once for the current address of the primary adapter.
    pub fn resolve_current_address(&self) -> Result<HostNetworkAddress, AddressUnavailable> {
        let raw = self
            .platform
            .ethernet_parameter(EthernetParameter::CurrentIpAddress, PRIMARY_ADAPTER)
            .ok_or(AddressUnavailable::Missing {
                adapter: PRIMARY_ADAPTER,
            })?;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressUnavailable::Missing {
                adapter: PRIMARY_ADAPTER,
            });
        }

        let address = trimmed
            .parse::<HostNetworkAddress>()
            .map_err(|_| AddressUnavailable::Malformed {
                adapter: PRIMARY_ADAPTER,
                raw: raw.clone(),
            })?;

        tracing::debug!(address = %address, "Resolved host network address");
        Ok(address)
    }
}
