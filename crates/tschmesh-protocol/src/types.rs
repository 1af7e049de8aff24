//! Core protocol types

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of a mote address in bytes (EUI-64)
pub const EUI64_SIZE: usize = 8;

/// 64-bit extended unique identifier of a mote
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Eui64([u8; EUI64_SIZE]);

impl Eui64 {
    /// The all-zero address, used by neighbor reports as a "no route" sentinel
    pub const UNSPECIFIED: Eui64 = Eui64([0u8; EUI64_SIZE]);

    /// Create an address from its raw bytes
    pub const fn from_bytes(bytes: [u8; EUI64_SIZE]) -> Self {
        Eui64(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; EUI64_SIZE] {
        &self.0
    }

    /// Build an address from a slice, which must be exactly 8 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let arr: [u8; EUI64_SIZE] = bytes.try_into().map_err(|_| {
            ProtocolError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                EUI64_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Eui64(arr))
    }

    /// Convert to a compact hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex, with or without `-`/`:` separators
    pub fn from_hex(s: &str) -> Result<Self, ProtocolError> {
        let compact: String = s.chars().filter(|c| *c != '-' && *c != ':').collect();
        let bytes =
            hex::decode(&compact).map_err(|e| ProtocolError::InvalidAddress(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Whether this is the all-zero address
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0u8; EUI64_SIZE]
    }

    /// Last two bytes, the 16-bit short id the motes use on the air
    pub fn short_id(&self) -> u16 {
        u16::from_be_bytes([self.0[6], self.0[7]])
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({})", self.to_hex())
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{}", parts.join("-"))
    }
}

impl FromStr for Eui64 {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; EUI64_SIZE]> for Eui64 {
    fn from(bytes: [u8; EUI64_SIZE]) -> Self {
        Eui64(bytes)
    }
}

/// A directed wireless link, transmitter to receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub tx: Eui64,
    pub rx: Eui64,
}

impl Edge {
    pub fn new(tx: Eui64, rx: Eui64) -> Self {
        Edge { tx, rx }
    }

    /// The same link in the opposite direction
    pub fn reversed(&self) -> Self {
        Edge {
            tx: self.rx,
            rx: self.tx,
        }
    }

    /// Consecutive edges along a node path
    pub fn along(path: &[Eui64]) -> Vec<Edge> {
        path.windows(2).map(|w| Edge::new(w[0], w[1])).collect()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}->{:04x}", self.tx.short_id(), self.rx.short_id())
    }
}

/// Track identifier, one byte on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(u8);

impl TrackId {
    pub fn from_u8(value: u8) -> Self {
        TrackId(value)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {}", self.0)
    }
}

/// TSCH absolute slot number (40 bits on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Asn(u64);

impl Asn {
    /// Assemble from the little-endian (u16, u16, u8) triple motes report
    pub fn from_parts(low: u16, mid: u16, high: u8) -> Self {
        Asn(low as u64 | (mid as u64) << 16 | (high as u64) << 32)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eui64_hex_roundtrip() {
        let addr = Eui64::from_bytes([0, 18, 75, 0, 6, 13, 158, 217]);
        assert_eq!(addr.to_hex(), "00124b00060d9ed9");
        assert_eq!(addr.to_string(), "00-12-4b-00-06-0d-9e-d9");
        assert_eq!(Eui64::from_hex("00-12-4b-00-06-0d-9e-d9").unwrap(), addr);
        assert_eq!("00:12:4b:00:06:0d:9e:d9".parse::<Eui64>().unwrap(), addr);
        assert_eq!(addr.short_id(), 0x9ed9);
    }

    #[test]
    fn test_eui64_rejects_wrong_length() {
        assert!(Eui64::from_hex("00124b").is_err());
        assert!(Eui64::from_hex("zz124b00060d9ed9").is_err());
        assert!(Eui64::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_unspecified() {
        assert!(Eui64::UNSPECIFIED.is_unspecified());
        assert!(!Eui64::from_bytes([0, 0, 0, 0, 0, 0, 0, 1]).is_unspecified());
    }

    #[test]
    fn test_edges_along_path() {
        let a = Eui64::from_bytes([1; 8]);
        let b = Eui64::from_bytes([2; 8]);
        let c = Eui64::from_bytes([3; 8]);

        let edges = Edge::along(&[a, b, c]);
        assert_eq!(edges, vec![Edge::new(a, b), Edge::new(b, c)]);
        assert_eq!(edges[0].reversed(), Edge::new(b, a));
        assert!(Edge::along(&[a]).is_empty());
    }

    #[test]
    fn test_asn_from_parts() {
        let asn = Asn::from_parts(0x0001, 0x0002, 0x03);
        assert_eq!(asn.as_u64(), 0x03_0002_0001);
    }

    #[test]
    fn test_eui64_serde() {
        let addr = Eui64::from_bytes([0, 18, 75, 0, 6, 13, 159, 74]);
        let json = serde_json::to_string(&addr).unwrap();
        let back: Eui64 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
