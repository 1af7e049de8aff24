//! TSCH Mesh Protocol Module
//!
//! Wire-level types shared by the track controller: mote addresses,
//! directed links, track identifiers and the fixed-length forwarding
//! bitmaps exchanged with motes.

pub mod bitmap;
pub mod error;
pub mod feedback;
pub mod types;

pub use bitmap::{BitIndexMap, Bitmap};
pub use error::{ProtocolError, Result};
pub use feedback::FeedbackReport;
pub use types::{Asn, Edge, Eui64, TrackId};
