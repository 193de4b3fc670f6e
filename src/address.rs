//! IPv4 prefixes and per-segment address allocation.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing prefixes or allocating addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid prefix '{0}', expected a.b.c.d/len")]
    InvalidPrefix(String),

    #[error("prefix length {0} is out of range (0-32)")]
    PrefixLength(u8),

    #[error("address pool {0} is exhausted")]
    Exhausted(Prefix),

    #[error("address {address} is not inside {prefix}")]
    OutsidePrefix { address: Ipv4Addr, prefix: Prefix },
}

/// A network prefix such as `10.1.1.0/24`.
///
/// Host bits of the network address are always cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    network: Ipv4Addr,
    len: u8,
}

impl Prefix {
    /// The default route, `0.0.0.0/0`.
    pub const DEFAULT: Prefix = Prefix {
        network: Ipv4Addr::UNSPECIFIED,
        len: 0,
    };

    /// Creates a prefix, masking off any host bits of `address`.
    pub fn new(address: Ipv4Addr, len: u8) -> Result<Self, AddressError> {
        if len > 32 {
            return Err(AddressError::PrefixLength(len));
        }
        let network = Ipv4Addr::from(u32::from(address) & mask_bits(len));
        Ok(Self { network, len })
    }

    /// Network address.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// Returns true for the default route.
    pub fn is_default(&self) -> bool {
        self.len == 0
    }

    /// Netmask in dotted form.
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.len))
    }

    /// Directed broadcast address of the prefix.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask_bits(self.len))
    }

    /// Returns true if `address` falls inside this prefix.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & mask_bits(self.len) == u32::from(self.network)
    }

    /// Number of assignable host addresses (network and broadcast excluded).
    pub fn host_capacity(&self) -> u32 {
        match self.len {
            32 => 1,
            31 => 2,
            len => ((1u64 << (32 - len)) - 2).min(u64::from(u32::MAX)) as u32,
        }
    }

    /// The `n`-th host address, counting from 1.
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        if n == 0 || n > self.host_capacity() {
            return None;
        }
        // /31 and /32 have no network or broadcast address to skip
        let offset = if self.len >= 31 { n - 1 } else { n };
        Some(Ipv4Addr::from(u32::from(self.network) + offset))
    }
}

fn mask_bits(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Prefix {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidPrefix(s.to_string());
        let (addr, len) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let len: u8 = len.parse().map_err(|_| invalid())?;
        Prefix::new(addr, len)
    }
}

impl TryFrom<String> for Prefix {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.to_string()
    }
}

/// Hands out host addresses of a prefix in ascending order (.1, .2, ...).
#[derive(Clone, Debug)]
pub struct AddressAllocator {
    prefix: Prefix,
    next_host: u32,
}

impl AddressAllocator {
    /// Creates an allocator starting at the first host address of `prefix`.
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            next_host: 1,
        }
    }

    /// The prefix addresses are drawn from.
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Allocates the next free host address.
    pub fn allocate(&mut self) -> Result<Ipv4Addr, AddressError> {
        let address = self
            .prefix
            .host(self.next_host)
            .ok_or(AddressError::Exhausted(self.prefix))?;
        self.next_host += 1;
        Ok(address)
    }

    /// Number of addresses still available.
    pub fn remaining(&self) -> u32 {
        (self.prefix.host_capacity() + 1).saturating_sub(self.next_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_parsing() {
        let prefix: Prefix = "10.1.2.77/24".parse().unwrap();
        assert_eq!(prefix.network(), Ipv4Addr::new(10, 1, 2, 0));
        assert_eq!(prefix.prefix_len(), 24);
        assert_eq!(prefix.to_string(), "10.1.2.0/24");
        assert_eq!(prefix.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix.broadcast(), Ipv4Addr::new(10, 1, 2, 255));

        assert!("10.1.2.0".parse::<Prefix>().is_err());
        assert!("10.1.2.0/40".parse::<Prefix>().is_err());
        assert!("banana/24".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_prefix_contains() {
        let prefix: Prefix = "10.1.1.0/24".parse().unwrap();
        assert!(prefix.contains(Ipv4Addr::new(10, 1, 1, 200)));
        assert!(!prefix.contains(Ipv4Addr::new(10, 1, 2, 1)));
        assert!(Prefix::DEFAULT.contains(Ipv4Addr::new(192, 168, 0, 1)));
        assert!(Prefix::DEFAULT.is_default());
    }

    #[test]
    fn test_host_capacity() {
        assert_eq!("10.0.0.0/24".parse::<Prefix>().unwrap().host_capacity(), 254);
        assert_eq!("10.0.0.0/30".parse::<Prefix>().unwrap().host_capacity(), 2);
        assert_eq!("10.0.0.0/31".parse::<Prefix>().unwrap().host_capacity(), 2);
    }

    #[test]
    fn test_allocator_sequence() {
        let mut alloc = AddressAllocator::new("10.1.3.0/30".parse().unwrap());
        assert_eq!(alloc.remaining(), 2);
        assert_eq!(alloc.allocate().unwrap(), Ipv4Addr::new(10, 1, 3, 1));
        assert_eq!(alloc.allocate().unwrap(), Ipv4Addr::new(10, 1, 3, 2));
        assert_eq!(alloc.remaining(), 0);
        assert!(matches!(alloc.allocate(), Err(AddressError::Exhausted(_))));
    }

    #[test]
    fn test_prefix_serde() {
        let prefix: Prefix = serde_json::from_str("\"10.1.1.0/24\"").unwrap();
        assert_eq!(prefix.prefix_len(), 24);
        assert_eq!(serde_json::to_string(&prefix).unwrap(), "\"10.1.1.0/24\"");
    }
}
