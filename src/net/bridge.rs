//! Linux bridge management.
//!
//! The bridge is created on demand by the first ADD and destroyed by DEL.
//! Only one container is expected to hang off it.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::net::netlink::{Link, Netlink};

/// MTU given to newly created bridges.
pub const BRIDGE_MTU: u32 = 1500;

/// A link verified to be a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    pub index: u32,
    pub name: String,
    pub mtu: u32,
}

impl Bridge {
    /// Make `port` a port of this bridge and bring it up.
    pub async fn enslave(&self, nl: &Netlink, port: &Link) -> Result<()> {
        nl.set_master(port, self.index).await?;
        nl.set_up(port).await?;
        info!(bridge = %self.name, port = %port.name, "attached port to bridge");
        Ok(())
    }

    /// Links whose master is this bridge.
    pub async fn ports(&self, nl: &Netlink) -> Result<Vec<Link>> {
        let links = nl.links().await?;
        Ok(links
            .into_iter()
            .filter(|link| link.master == Some(self.index))
            .collect())
    }
}

/// Bridge lifecycle operations on the host namespace.
pub struct BridgeManager<'a> {
    nl: &'a Netlink,
}

impl<'a> BridgeManager<'a> {
    pub fn new(nl: &'a Netlink) -> Self {
        Self { nl }
    }

    /// Create the bridge if needed and bring it up. An existing device of
    /// another kind is rejected and left as it was.
    pub async fn ensure(&self, name: &str) -> Result<Link> {
        match self.nl.add_bridge(name, BRIDGE_MTU).await {
            Ok(()) => info!(bridge = name, "created bridge"),
            Err(e) if e.is_exists() => debug!(bridge = name, "bridge already exists"),
            Err(e) => return Err(e),
        }

        let link = self.nl.link_by_name(name).await?;
        // A foreign device with this name is refused before it is touched.
        link.clone().as_bridge()?;
        self.nl.set_up(&link).await?;
        Ok(link)
    }

    /// Re-resolve the bridge by name, rejecting non-bridge devices.
    pub async fn lookup(&self, name: &str) -> Result<Bridge> {
        self.nl.link_by_name(name).await?.as_bridge()
    }

    /// Bring the bridge down and delete it. A bridge that is already gone is
    /// not an error.
    pub async fn teardown(&self, name: &str) -> Result<()> {
        let bridge = match self.nl.link_by_name(name).await {
            Ok(link) => link,
            Err(e) if e.is_gone() => {
                warn!(bridge = name, "bridge already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        // Never delete a foreign device that happens to share the name.
        bridge.clone().as_bridge()?;

        match self.nl.set_down(&bridge).await {
            Ok(()) => {}
            Err(e) if e.is_gone() || e.is_exists() => {
                warn!(bridge = name, "ignoring error setting bridge down: {}", e)
            }
            Err(e) => return Err(e),
        }

        match self.nl.delete(&bridge).await {
            Ok(()) => info!(bridge = name, "deleted bridge"),
            Err(e) if e.is_gone() => warn!(bridge = name, "bridge vanished before delete"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
