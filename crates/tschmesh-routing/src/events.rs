//! Controller events
//!
//! Components never call into each other while holding their own locks;
//! anything another component must react to is published here instead.

use crate::link_state::ReliabilityReport;
use crate::track::TrackArc;
use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tschmesh_protocol::{Bitmap, Edge, Eui64, TrackId};

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A new track was built and finalized
    TrackInstalled {
        track_id: TrackId,
        root: Eui64,
        destination: Eui64,
        arcs: Vec<TrackArc>,
    },

    /// A bitmap was handed out for a destination
    EdgesEnabled {
        track_id: TrackId,
        destination: Eui64,
        edges: BTreeSet<Edge>,
        bitmap: Bitmap,
        sequence: u64,
    },

    /// A mote reported failed deliveries
    EdgesFailed {
        track_id: TrackId,
        mote_id: u16,
        edges: BTreeSet<Edge>,
        bitmap: Bitmap,
    },

    /// A reliability window closed
    ReliabilityUpdated(ReliabilityReport),
}

pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ControllerEvent>;

/// Create a channel for controller events
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
