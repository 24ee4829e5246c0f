//! Random link identities: container-side MAC addresses and host-side veth names.

use std::fmt;

use itertools::Itertools;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Error, Result};

const LOCAL_BIT: u8 = 0x02;
const MULTICAST_BIT: u8 = 0x01;

/// A 48-bit Ethernet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Generate a random locally administered unicast address.
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; 6];
        fill_random(&mut bytes, "MAC address")?;
        Ok(Self::from_random(bytes))
    }

    /// Force the locally administered bit on and the multicast bit off.
    pub fn from_random(mut bytes: [u8; 6]) -> Self {
        bytes[0] = (bytes[0] | LOCAL_BIT) & !MULTICAST_BIT;
        Self(bytes)
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether the locally administered bit is set.
    pub fn is_local(&self) -> bool {
        self.0[0] & LOCAL_BIT != 0
    }

    /// Whether the address is unicast.
    pub fn is_unicast(&self) -> bool {
        self.0[0] & MULTICAST_BIT == 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().map(|b| format!("{:02x}", b)).join(":"))
    }
}

/// Random host-side veth name, `veth` followed by 8 hex digits.
pub fn random_veth_name() -> Result<String> {
    let mut bytes = [0u8; 4];
    fill_random(&mut bytes, "veth name")?;
    Ok(format!("veth{}", bytes.iter().map(|b| format!("{:02x}", b)).join("")))
}

fn fill_random(buf: &mut [u8], what: &'static str) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| Error::Entropy(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_first_byte_becomes_local_unicast() {
        for first in 0..=u8::MAX {
            let mac = MacAddress::from_random([first, 0xff, 0xff, 0xff, 0xff, 0xff]);
            assert!(mac.is_local(), "byte {first:#04x}");
            assert!(mac.is_unicast(), "byte {first:#04x}");
            assert_eq!(mac.octets()[0] & 0xfc, first & 0xfc);
            assert_eq!(&mac.octets()[1..], &[0xff; 5]);
        }
    }

    #[test]
    fn random_addresses_are_local_unicast() {
        for _ in 0..256 {
            let mac = MacAddress::random().unwrap();
            assert!(mac.is_local());
            assert!(mac.is_unicast());
        }
    }

    #[test]
    fn display_is_colon_separated_lowercase() {
        let mac = MacAddress::from_random([0x00, 0xab, 0x0c, 0x10, 0xff, 0x01]);
        assert_eq!(mac.to_string(), "02:ab:0c:10:ff:01");
    }

    #[test]
    fn veth_names_fit_ifnamsiz() {
        let name = random_veth_name().unwrap();
        assert!(name.starts_with("veth"));
        assert_eq!(name.len(), 12);
        assert!(name[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
