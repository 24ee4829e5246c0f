use tracing::{debug, info};

use crate::config::{validate_ifname, NetConf};
use crate::error::{Error, Result};
use crate::net::bridge::BridgeManager;
use crate::net::veth::{self, VETH_MTU};
use crate::net::{address, MacAddress, NetNs, Netlink};
use crate::types::CmdArgs;

/// Bridge plugin implementation
///
/// ADD and DEL stop at the first failure. Nothing created before that point
/// is rolled back; a later DEL cleans up.
pub struct BridgePlugin {
    /// Network configuration
    config: NetConf,
    /// Command arguments
    args: CmdArgs,
}

impl BridgePlugin {
    /// Create a new bridge plugin
    pub fn new(config: NetConf, args: CmdArgs) -> Self {
        Self { config, args }
    }

    /// Attach the container to the bridge
    pub async fn add_network(&self) -> Result<()> {
        // Validate all input before touching the kernel
        let spec = self.config.attachment()?;
        validate_ifname("CNI_IFNAME", &self.args.ifname)?;
        let ifname = self.args.ifname.as_str();
        info!(bridge = %spec.bridge_name, ifname, netns = %self.args.netns, "adding network");

        let host_nl = Netlink::connect()?;
        let bridges = BridgeManager::new(&host_nl);
        bridges.ensure(&spec.bridge_name).await?;
        let bridge = bridges.lookup(&spec.bridge_name).await?;
        debug!(bridge = %bridge.name, index = bridge.index, "bridge ready");

        let netns = NetNs::from_path(&self.args.netns)?;
        let host_ns = NetNs::current()?;
        let mac = MacAddress::random()?;

        let pair = netns
            .exec(async {
                let nl = Netlink::connect()?;
                let pair = veth::create(&nl, ifname, VETH_MTU, &mac, &host_ns).await?;
                address::assign(&nl, &pair.container.name, &spec.address).await?;
                Ok::<_, Error>(pair)
            })
            .await?;

        let host_veth = pair.host_link(&host_nl).await?;
        bridge.enslave(&host_nl, &host_veth).await?;

        info!(
            bridge = %bridge.name,
            host = %host_veth.name,
            ifname,
            address = %spec.address,
            subnet = %spec.address.network(),
            %mac,
            "container attached"
        );
        Ok(())
    }

    /// Detach the container and remove the bridge
    pub async fn del_network(&self) -> Result<()> {
        let bridge_name = self.config.bridge()?;
        validate_ifname("CNI_IFNAME", &self.args.ifname)?;
        let ifname = self.args.ifname.as_str();
        info!(bridge = %bridge_name, ifname, netns = %self.args.netns, "deleting network");

        let netns = NetNs::from_path(&self.args.netns)?;
        netns
            .exec(async {
                let nl = Netlink::connect()?;
                veth::delete(&nl, ifname).await
            })
            .await?;

        let host_nl = Netlink::connect()?;
        BridgeManager::new(&host_nl).teardown(&bridge_name).await?;

        info!(bridge = %bridge_name, ifname, "container detached");
        Ok(())
    }

    /// Check is not implemented and always succeeds
    pub async fn check_network(&self) -> Result<()> {
        info!(
            container_id = %self.args.container_id,
            ifname = %self.args.ifname,
            "check requested, nothing to verify"
        );
        Ok(())
    }
}
