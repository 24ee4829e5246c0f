//! Virtual ethernet pair management.
//!
//! Both functions here expect the calling thread to already be inside the
//! container namespace and `nl` to have been opened there.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::net::mac::{self, MacAddress};
use crate::net::netlink::{Link, Netlink};
use crate::net::netns::NetNs;

/// MTU given to both ends of the pair.
pub const VETH_MTU: u32 = 1500;

const HOST_NAME_ATTEMPTS: usize = 8;

/// How to find the host-side endpoint once back in the host namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSide {
    /// Freshly created with this name.
    Name(String),
    /// Pre-existing pair, known only by the peer index in the host namespace.
    Index(u32),
}

/// The two ends of a container attachment.
#[derive(Debug, Clone)]
pub struct VethPair {
    pub host: HostSide,
    pub container: Link,
}

impl VethPair {
    /// Resolve the host end. `nl` must be a host-namespace connection.
    ///
    /// The link found must be a veth peered with the container end, so an
    /// unrelated host device that happens to share the index is refused.
    pub async fn host_link(&self, nl: &Netlink) -> Result<Link> {
        let link = match &self.host {
            HostSide::Name(name) => nl.link_by_name(name).await?,
            HostSide::Index(index) => nl.link_by_index(*index).await?,
        };
        link.ensure_peer_of(&self.container)?;
        Ok(link)
    }
}

/// Create `ifname` in the current namespace with its peer in `host_ns`, then
/// bring the container end up.
///
/// An existing veth called `ifname` is reused. A clash on the random host-side
/// name is retried with a new one.
pub async fn create(
    nl: &Netlink,
    ifname: &str,
    mtu: u32,
    mac: &MacAddress,
    host_ns: &NetNs,
) -> Result<VethPair> {
    for _ in 0..HOST_NAME_ATTEMPTS {
        let host_name = mac::random_veth_name()?;
        match nl.add_veth(ifname, &host_name, mtu, mac.octets(), host_ns).await {
            Ok(()) => {
                let container = nl.link_by_name(ifname).await?;
                nl.set_up(&container).await?;
                info!(ifname, host = %host_name, %mac, "created veth pair");
                return Ok(VethPair {
                    host: HostSide::Name(host_name),
                    container,
                });
            }
            Err(e) if e.is_exists() => match nl.link_by_name(ifname).await {
                Ok(existing) => {
                    let peer = existing.veth_peer()?;
                    if existing.peer_netnsid.is_none() {
                        return Err(Error::DeviceConflict {
                            name: existing.name,
                            expected: "veth peered into the host namespace",
                            found: "veth peered in its own namespace".to_string(),
                        });
                    }
                    nl.set_up(&existing).await?;
                    info!(ifname, peer, "reusing existing veth");
                    return Ok(VethPair {
                        host: HostSide::Index(peer),
                        container: existing,
                    });
                }
                Err(lookup) if lookup.is_gone() => {
                    debug!(host = %host_name, "host-side veth name taken, retrying");
                }
                Err(lookup) => return Err(lookup),
            },
            Err(e) => return Err(e),
        }
    }

    Err(Error::DeviceConflict {
        name: ifname.to_string(),
        expected: "free host-side veth name",
        found: format!("{HOST_NAME_ATTEMPTS} collisions"),
    })
}

/// Delete the container end. The kernel removes the host end with it.
pub async fn delete(nl: &Netlink, ifname: &str) -> Result<()> {
    let link = match nl.link_by_name(ifname).await {
        Ok(link) => link,
        Err(e) if e.is_gone() => {
            warn!(ifname, "container interface already gone");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match nl.delete(&link).await {
        Ok(()) => {
            info!(ifname, "deleted container interface");
            Ok(())
        }
        Err(e) if e.is_gone() => {
            warn!(ifname, "container interface vanished before delete");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
