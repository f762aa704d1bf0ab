//! IPv4 interface and network values
//!
//! Both types parse from and serialize to their textual `a.b.c.d/len` form so
//! that they round-trip through YAML unchanged.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

fn netmask_bits(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

fn split_cidr(value: &str) -> Result<(Ipv4Addr, u8), ConfigError> {
    let (addr, len) = value.split_once('/').ok_or_else(|| ConfigError::Address {
        value: value.to_string(),
        message: "expected <address>/<prefix-length>".to_string(),
    })?;

    let address = addr.parse::<Ipv4Addr>().map_err(|e| ConfigError::Address {
        value: value.to_string(),
        message: e.to_string(),
    })?;

    let prefix_len = len.parse::<u8>().ok().filter(|l| *l <= 32).ok_or_else(|| {
        ConfigError::Address {
            value: value.to_string(),
            message: format!("prefix length `{}` is not between 0 and 32", len),
        }
    })?;

    Ok((address, prefix_len))
}

/// Offset an address by `offset`, failing on overflow past 255.255.255.255.
pub fn offset_address(base: Ipv4Addr, offset: u32) -> Option<Ipv4Addr> {
    u32::from(base).checked_add(offset).map(Ipv4Addr::from)
}

/// An IPv4 network such as `10.0.1.0/24`. Host bits must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Network {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, ConfigError> {
        if prefix_len > 32 {
            return Err(ConfigError::Address {
                value: format!("{}/{}", network, prefix_len),
                message: "prefix length must not exceed 32".to_string(),
            });
        }
        if u32::from(network) & !netmask_bits(prefix_len) != 0 {
            return Err(ConfigError::Address {
                value: format!("{}/{}", network, prefix_len),
                message: "host bits are set".to_string(),
            });
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn network_address(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !netmask_bits(self.prefix_len))
    }

    /// First host address, used as default gateway and nameserver.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network).wrapping_add(1))
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & netmask_bits(self.prefix_len) == u32::from(self.network)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, prefix_len) = split_cidr(s.trim())?;
        Self::new(network, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Network {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Network> for String {
    fn from(value: Ipv4Network) -> Self {
        value.to_string()
    }
}

/// A host address together with its network, such as `10.0.0.5/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Interface {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Interface {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, ConfigError> {
        if prefix_len > 32 {
            return Err(ConfigError::Address {
                value: format!("{}/{}", address, prefix_len),
                message: "prefix length must not exceed 32".to_string(),
            });
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn network(&self) -> Ipv4Network {
        Ipv4Network {
            network: Ipv4Addr::from(u32::from(self.address) & netmask_bits(self.prefix_len)),
            prefix_len: self.prefix_len,
        }
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.network().gateway()
    }
}

impl fmt::Display for Ipv4Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Interface {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix_len) = split_cidr(s.trim())?;
        Self::new(address, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Interface {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Interface> for String {
    fn from(value: Ipv4Interface) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_gateway_is_first_host() {
        let network: Ipv4Network = "10.0.1.0/24".parse().unwrap();
        assert_eq!(network.network_address(), Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(network.gateway(), Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(network.broadcast_address(), Ipv4Addr::new(10, 0, 1, 255));
        assert_eq!(network.prefix_len(), 24);
    }

    #[test]
    fn test_network_rejects_host_bits() {
        let err = "10.0.1.5/24".parse::<Ipv4Network>().unwrap_err();
        assert!(err.to_string().contains("host bits"));
    }

    #[test]
    fn test_network_rejects_garbage() {
        assert!("10.0.1.0".parse::<Ipv4Network>().is_err());
        assert!("10.0.1.0/33".parse::<Ipv4Network>().is_err());
        assert!("10.0.300.0/24".parse::<Ipv4Network>().is_err());
    }

    #[test]
    fn test_network_contains() {
        let network: Ipv4Network = "192.168.10.0/26".parse().unwrap();
        assert!(network.contains(Ipv4Addr::new(192, 168, 10, 63)));
        assert!(!network.contains(Ipv4Addr::new(192, 168, 10, 64)));
    }

    #[test]
    fn test_interface_network() {
        let iface: Ipv4Interface = "10.0.0.5/24".parse().unwrap();
        assert_eq!(iface.address(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(iface.network().to_string(), "10.0.0.0/24");
        assert_eq!(iface.gateway(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(iface.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn test_offset_address() {
        let base = Ipv4Addr::new(10, 0, 1, 10);
        assert_eq!(offset_address(base, 2), Some(Ipv4Addr::new(10, 0, 1, 12)));
        assert_eq!(
            offset_address(Ipv4Addr::new(10, 0, 0, 255), 1),
            Some(Ipv4Addr::new(10, 0, 1, 0))
        );
        assert_eq!(offset_address(Ipv4Addr::BROADCAST, 1), None);
    }

    #[test]
    fn test_serde_as_string() {
        let iface: Ipv4Interface = serde_yaml::from_str("10.0.0.5/24").unwrap();
        let yaml = serde_yaml::to_string(&iface).unwrap();
        assert_eq!(yaml.trim(), "10.0.0.5/24");
    }

    proptest::proptest! {
        #[test]
        fn prop_offset_is_injective_and_ordered(start in 0u32..u32::MAX - 1024, count in 1u32..512) {
            let base = Ipv4Addr::from(start);
            let addresses: Vec<Ipv4Addr> = (0..count)
                .map(|i| offset_address(base, i).unwrap())
                .collect();
            proptest::prop_assert_eq!(addresses[0], base);
            for pair in addresses.windows(2) {
                proptest::prop_assert_eq!(u32::from(pair[1]), u32::from(pair[0]) + 1);
            }
        }
    }
}
