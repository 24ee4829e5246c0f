//! Interface addressing.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::net::netlink::Netlink;

/// An address together with the prefix length of its subnet.
///
/// The address is kept exactly as written: `10.0.0.5/24` binds `10.0.0.5`,
/// not the network base `10.0.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress(IpNetwork);

impl InterfaceAddress {
    /// Parse CIDR notation. The `/prefix` part is mandatory.
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        if !cidr.contains('/') {
            return Err(Error::Input(format!(
                "invalid CIDR address {cidr:?}: missing prefix length"
            )));
        }
        IpNetwork::from_str(cidr)
            .map(Self)
            .map_err(|e| Error::Input(format!("invalid CIDR address {cidr:?}: {e}")))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Subnet the address belongs to.
    pub fn network(&self) -> IpNetwork {
        IpNetwork::new(self.0.network(), self.0.prefix()).unwrap_or(self.0)
    }
}

impl FromStr for InterfaceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip(), self.prefix())
    }
}

/// Bind `addr` to `ifname` in the connection's namespace.
pub async fn assign(nl: &Netlink, ifname: &str, addr: &InterfaceAddress) -> Result<()> {
    let link = nl.link_by_name(ifname).await?;
    match nl.add_address(&link, addr.ip(), addr.prefix()).await {
        Ok(()) => {
            info!(ifname, %addr, "assigned address");
            Ok(())
        }
        Err(e) if e.is_exists() => {
            warn!(ifname, %addr, "address already assigned");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn keeps_host_address_not_network_base() {
        let addr = InterfaceAddress::parse("10.0.0.5/24").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(addr.prefix(), 24);
        assert_eq!(addr.network().ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(addr.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn parses_ipv6() {
        let addr: InterfaceAddress = "fd00::5/64".parse().unwrap();
        assert_eq!(addr.ip(), IpAddr::V6("fd00::5".parse::<Ipv6Addr>().unwrap()));
        assert_eq!(addr.prefix(), 64);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = InterfaceAddress::parse("10.0.0.5").unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn rejects_bad_prefix_and_address() {
        assert!(InterfaceAddress::parse("10.0.0.5/33").is_err());
        assert!(InterfaceAddress::parse("10.0.0.256/24").is_err());
        assert!(InterfaceAddress::parse("not-an-ip/24").is_err());
        assert!(InterfaceAddress::parse("").is_err());
    }
}
