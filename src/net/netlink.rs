use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, RawFd};

use futures::TryStreamExt;
use netlink_packet_route::link::nlas::{Info, InfoData, InfoKind, Nla, VethInfo};
use netlink_packet_route::{LinkMessage, IFF_UP};
use tracing::debug;

use crate::error::{Error, Result};
use crate::net::bridge::Bridge;
use crate::net::netns::NetNs;

/// Netlink connection bound to the namespace that was current when it was
/// opened. Requests keep targeting that namespace even after the thread moves.
pub struct Netlink {
    handle: rtnetlink::Handle,
    conn_task: tokio::task::JoinHandle<()>,
}

impl Netlink {
    /// Open a connection in the calling thread's current namespace.
    /// Must be called from inside a tokio runtime.
    pub fn connect() -> Result<Self> {
        let (conn, handle, _) = rtnetlink::new_connection()?;
        let conn_task = tokio::spawn(conn);
        Ok(Self { handle, conn_task })
    }

    /// Resolve a link by name.
    pub async fn link_by_name(&self, name: &str) -> Result<Link> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match links.try_next().await {
            Ok(Some(msg)) => Ok(Link::from_message(msg)),
            Ok(None) => Err(Error::LinkNotFound(name.to_string())),
            Err(e) => {
                let err = Error::kernel("look up", name, e);
                if err.is_gone() {
                    Err(Error::LinkNotFound(name.to_string()))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Resolve a link by interface index.
    pub async fn link_by_index(&self, index: u32) -> Result<Link> {
        let mut links = self.handle.link().get().match_index(index).execute();
        match links.try_next().await {
            Ok(Some(msg)) => Ok(Link::from_message(msg)),
            Ok(None) => Err(Error::LinkNotFound(format!("#{index}"))),
            Err(e) => {
                let err = Error::kernel("look up", format!("#{index}"), e);
                if err.is_gone() {
                    Err(Error::LinkNotFound(format!("#{index}")))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Every link in the namespace.
    pub async fn links(&self) -> Result<Vec<Link>> {
        let mut stream = self.handle.link().get().execute();
        let mut links = Vec::new();
        while let Some(msg) = stream
            .try_next()
            .await
            .map_err(|e| Error::kernel("list", "links", e))?
        {
            links.push(Link::from_message(msg));
        }
        Ok(links)
    }

    /// Create a bridge. The transmit queue length is left for the kernel to
    /// pick; a zero-length queue breaks FIFO shapers.
    pub async fn add_bridge(&self, name: &str, mtu: u32) -> Result<()> {
        debug!(bridge = name, mtu, "creating bridge");
        let mut req = self.handle.link().add().bridge(name.to_string());
        req.message_mut().nlas.push(Nla::Mtu(mtu));
        req.execute()
            .await
            .map_err(|e| Error::kernel("create bridge", name, e))
    }

    /// Create a veth pair in this connection's namespace, with the peer placed
    /// directly into `peer_ns`.
    pub async fn add_veth(
        &self,
        name: &str,
        peer: &str,
        mtu: u32,
        mac: [u8; 6],
        peer_ns: &NetNs,
    ) -> Result<()> {
        debug!(ifname = name, peer, mtu, "creating veth pair");
        let mut req = self.handle.link().add();
        *req.message_mut() = veth_message(name, peer, mtu, mac, peer_ns.as_raw_fd());
        req.execute()
            .await
            .map_err(|e| Error::kernel("create veth", name, e))
    }

    /// Set a link administratively up.
    pub async fn set_up(&self, link: &Link) -> Result<()> {
        debug!(link = %link.name, "setting link up");
        self.handle
            .link()
            .set(link.index)
            .up()
            .execute()
            .await
            .map_err(|e| Error::kernel("set up", &link.name, e))
    }

    /// Set a link administratively down.
    pub async fn set_down(&self, link: &Link) -> Result<()> {
        debug!(link = %link.name, "setting link down");
        self.handle
            .link()
            .set(link.index)
            .down()
            .execute()
            .await
            .map_err(|e| Error::kernel("set down", &link.name, e))
    }

    /// Attach `link` to `master`.
    pub async fn set_master(&self, link: &Link, master: u32) -> Result<()> {
        debug!(link = %link.name, master, "setting link master");
        self.handle
            .link()
            .set(link.index)
            .master(master)
            .execute()
            .await
            .map_err(|e| Error::kernel("set master of", &link.name, e))
    }

    /// Delete a link.
    pub async fn delete(&self, link: &Link) -> Result<()> {
        debug!(link = %link.name, "deleting link");
        self.handle
            .link()
            .del(link.index)
            .execute()
            .await
            .map_err(|e| Error::kernel("delete", &link.name, e))
    }

    /// Bind an address to a link with no label.
    pub async fn add_address(&self, link: &Link, addr: IpAddr, prefix: u8) -> Result<()> {
        debug!(link = %link.name, %addr, prefix, "adding address");
        self.handle
            .address()
            .add(link.index, addr, prefix)
            .execute()
            .await
            .map_err(|e| Error::kernel("add address to", &link.name, e))
    }
}

/// RTM_NEWLINK body for a veth pair. The top-level message is the local end
/// and carries the MAC; the `VethInfo::Peer` message names the far end and
/// the namespace it is created in.
pub fn veth_message(name: &str, peer: &str, mtu: u32, mac: [u8; 6], peer_ns: RawFd) -> LinkMessage {
    let mut peer_msg = LinkMessage::default();
    peer_msg.nlas.push(Nla::IfName(peer.to_string()));
    peer_msg.nlas.push(Nla::Mtu(mtu));
    peer_msg.nlas.push(Nla::NetNsFd(peer_ns));

    let mut msg = LinkMessage::default();
    msg.nlas.push(Nla::IfName(name.to_string()));
    msg.nlas.push(Nla::Mtu(mtu));
    msg.nlas.push(Nla::Address(mac.to_vec()));
    msg.nlas.push(Nla::Info(vec![
        Info::Kind(InfoKind::Veth),
        Info::Data(InfoData::Veth(VethInfo::Peer(peer_msg))),
    ]));
    msg
}

impl Drop for Netlink {
    fn drop(&mut self) {
        self.conn_task.abort();
    }
}

/// Kind reported in `IFLA_INFO_KIND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Bridge,
    Veth,
    Other(String),
    /// Physical devices and loopback carry no kind.
    Unknown,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Bridge => write!(f, "bridge"),
            LinkKind::Veth => write!(f, "veth"),
            LinkKind::Other(kind) => write!(f, "{kind}"),
            LinkKind::Unknown => write!(f, "device"),
        }
    }
}

/// A link as the kernel reported it.
#[derive(Debug, Clone)]
pub struct Link {
    pub index: u32,
    pub name: String,
    pub kind: LinkKind,
    pub flags: u32,
    pub mtu: Option<u32>,
    pub master: Option<u32>,
    /// For veths, the peer's index in the peer's namespace.
    pub peer_index: Option<u32>,
    /// Set when the peer lives in another namespace.
    pub peer_netnsid: Option<i32>,
    pub mac: Option<Vec<u8>>,
}

impl Link {
    pub fn from_message(msg: LinkMessage) -> Self {
        let mut link = Link {
            index: msg.header.index,
            name: String::new(),
            kind: LinkKind::Unknown,
            flags: msg.header.flags,
            mtu: None,
            master: None,
            peer_index: None,
            peer_netnsid: None,
            mac: None,
        };
        for nla in msg.nlas {
            match nla {
                Nla::IfName(name) => link.name = name,
                Nla::Mtu(mtu) => link.mtu = Some(mtu),
                Nla::Master(idx) => link.master = Some(idx),
                Nla::Link(idx) => link.peer_index = Some(idx),
                Nla::NetnsId(id) => link.peer_netnsid = Some(id),
                Nla::Address(mac) => link.mac = Some(mac),
                Nla::Info(infos) => {
                    for info in infos {
                        if let Info::Kind(kind) = info {
                            link.kind = match kind {
                                InfoKind::Bridge => LinkKind::Bridge,
                                InfoKind::Veth => LinkKind::Veth,
                                InfoKind::Other(other) => LinkKind::Other(other),
                                other => LinkKind::Other(format!("{other:?}").to_lowercase()),
                            };
                        }
                    }
                }
                _ => {}
            }
        }
        if link.kind != LinkKind::Veth {
            link.peer_index = None;
            link.peer_netnsid = None;
        }
        link
    }

    /// Administrative state.
    pub fn is_up(&self) -> bool {
        self.flags & IFF_UP != 0
    }

    /// Reinterpret as a bridge, refusing any other kind of device.
    pub fn as_bridge(self) -> Result<Bridge> {
        if self.kind != LinkKind::Bridge {
            return Err(Error::DeviceConflict {
                name: self.name,
                expected: "bridge",
                found: self.kind.to_string(),
            });
        }
        Ok(Bridge {
            index: self.index,
            name: self.name,
            mtu: self.mtu.unwrap_or(crate::net::bridge::BRIDGE_MTU),
        })
    }

    /// Require a veth whose peer is `other`, seen from the other namespace.
    pub fn ensure_peer_of(&self, other: &Link) -> Result<()> {
        if self.veth_peer()? != other.index {
            return Err(Error::DeviceConflict {
                name: self.name.clone(),
                expected: "peer of the container veth",
                found: format!("veth peered with #{}", self.peer_index.unwrap_or_default()),
            });
        }
        Ok(())
    }

    /// Require a veth and return its peer index.
    pub fn veth_peer(&self) -> Result<u32> {
        match (&self.kind, self.peer_index) {
            (LinkKind::Veth, Some(peer)) => Ok(peer),
            _ => Err(Error::DeviceConflict {
                name: self.name.clone(),
                expected: "veth",
                found: self.kind.to_string(),
            }),
        }
    }
}
