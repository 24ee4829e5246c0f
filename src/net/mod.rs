//! Kernel-facing building blocks: namespaces, links, bridges, veths, addresses.

pub mod address;
pub mod bridge;
pub mod mac;
pub mod netlink;
pub mod netns;
pub mod veth;

pub use address::InterfaceAddress;
pub use bridge::{Bridge, BridgeManager};
pub use mac::MacAddress;
pub use netlink::{Link, LinkKind, Netlink};
pub use netns::NetNs;
pub use veth::{HostSide, VethPair};
