//! Delivery feedback reported by motes

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::types::{Asn, TrackId};
use serde::{Deserialize, Serialize};

/// A failure bitmap sent back by a mote for one track
///
/// Each set bit flags a track edge on which the mote saw delivery fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub track_id: TrackId,
    /// 16-bit short id of the reporting mote
    pub mote_id: u16,
    /// Slot in which the report was generated
    pub asn: Asn,
    /// Raw bitmap bytes, MSB first, padded to a byte boundary
    pub bit_bytes: Vec<u8>,
}

impl FeedbackReport {
    pub fn new(track_id: TrackId, mote_id: u16, asn: Asn, bit_bytes: Vec<u8>) -> Self {
        FeedbackReport {
            track_id,
            mote_id,
            asn,
            bit_bytes,
        }
    }

    /// Interpret the payload against a track whose bitmaps are `len` bits long
    pub fn bitmap(&self, len: usize) -> Result<Bitmap> {
        Bitmap::from_bytes(&self.bit_bytes, len)
    }
}
