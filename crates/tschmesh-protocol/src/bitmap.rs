//! Fixed-length forwarding bitmaps
//!
//! A bitmap carries one flag per bit index allocated on a track. Outbound
//! bitmaps tell motes which track edges a packet may use; bitmaps reported
//! back by motes flag the edges on which delivery failed.

use crate::error::{ProtocolError, Result};
use crate::types::Edge;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A fixed-length string of bit flags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bitmap {
    bits: Vec<bool>,
}

impl Bitmap {
    /// All bits cleared
    pub fn zeros(len: usize) -> Self {
        Bitmap {
            bits: vec![false; len],
        }
    }

    /// All bits set
    pub fn ones(len: usize) -> Self {
        Bitmap {
            bits: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Read one bit; out-of-range indices read as cleared
    pub fn get(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize) -> Result<()> {
        let len = self.bits.len();
        let bit = self
            .bits
            .get_mut(index)
            .ok_or(ProtocolError::BitIndexOutOfRange { index, len })?;
        *bit = true;
        Ok(())
    }

    /// Indices of every set bit, ascending
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, b)| if *b { Some(i) } else { None })
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Whether any bit is set in both bitmaps
    pub fn intersects(&self, other: &Bitmap) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .any(|(a, b)| *a && *b)
    }

    /// Expand mote-reported bytes, MSB first, keeping the first `len` bits.
    ///
    /// Motes pad the bitmap to a whole number of bytes; padding bits are
    /// dropped.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self> {
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(ProtocolError::BitmapTooShort {
                needed,
                got: bytes.len(),
            });
        }

        let bits = (0..len)
            .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect();
        Ok(Bitmap { bits })
    }

    /// Pack into bytes, MSB first, zero padded
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.bits.len().div_ceil(8)];
        for i in self.iter_set() {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
        bytes
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self
            .bits
            .iter()
            .map(|b| if *b { '1' } else { '0' })
            .collect();
        f.write_str(&s)
    }
}

impl FromStr for Bitmap {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(ProtocolError::InvalidBitChar(other)),
            })
            .collect::<Result<Vec<bool>>>()?;
        Ok(Bitmap { bits })
    }
}

/// Edge to bit-index assignment for one track
///
/// Several edges may share an index: an arc pairs a direct continuation with
/// its alternate so that both are steered by the same flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitIndexMap {
    by_edge: BTreeMap<Edge, usize>,
    by_index: Vec<Vec<Edge>>,
}

impl BitIndexMap {
    /// Empty map producing bitmaps of `len` bits
    pub fn new(len: usize) -> Self {
        BitIndexMap {
            by_edge: BTreeMap::new(),
            by_index: vec![Vec::new(); len],
        }
    }

    /// Build a map from `(edge, index)` pairs
    pub fn from_assignments<I>(len: usize, assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Edge, usize)>,
    {
        let mut map = Self::new(len);
        for (edge, index) in assignments {
            map.insert(edge, index)?;
        }
        Ok(map)
    }

    /// Assign `index` to `edge`, replacing any previous assignment
    pub fn insert(&mut self, edge: Edge, index: usize) -> Result<()> {
        let len = self.by_index.len();
        if index >= len {
            return Err(ProtocolError::BitIndexOutOfRange { index, len });
        }
        if let Some(old) = self.by_edge.insert(edge, index) {
            self.by_index[old].retain(|e| *e != edge);
        }
        self.by_index[index].push(edge);
        Ok(())
    }

    /// Bitmap length in bits
    pub fn bit_len(&self) -> usize {
        self.by_index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.by_edge.len()
    }

    pub fn index_of(&self, edge: &Edge) -> Option<usize> {
        self.by_edge.get(edge).copied()
    }

    /// Edges steered by one bit
    pub fn edges_at(&self, index: usize) -> &[Edge] {
        self.by_index.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.by_edge.keys()
    }

    /// Set the bit of every edge in `edges`
    pub fn encode<'a, I>(&self, edges: I) -> Result<Bitmap>
    where
        I: IntoIterator<Item = &'a Edge>,
    {
        let mut bitmap = Bitmap::zeros(self.bit_len());
        for edge in edges {
            let index = self
                .index_of(edge)
                .ok_or(ProtocolError::MissingBitIndex(*edge))?;
            bitmap.set(index)?;
        }
        Ok(bitmap)
    }

    /// Every edge whose bit is set in `bitmap`
    pub fn decode(&self, bitmap: &Bitmap) -> Result<BTreeSet<Edge>> {
        if bitmap.len() != self.bit_len() {
            return Err(ProtocolError::BitmapWrongLength {
                expected: self.bit_len(),
                got: bitmap.len(),
            });
        }
        Ok(bitmap
            .iter_set()
            .flat_map(|i| self.by_index[i].iter().copied())
            .collect())
    }
}
