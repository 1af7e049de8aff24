//! TSCH Track Routing
//!
//! Control plane of the track controller:
//! - Topology store fed by mote neighbor reports
//! - Redundant track construction with shared bit indices
//! - Per-track bitmap dispatch, failure feedback and rerouting
//! - Windowed link reliability estimates

pub mod builder;
pub mod error;
pub mod events;
pub mod link_state;
pub mod manager;
pub mod paths;
pub mod route;
pub mod topology;
pub mod track;
pub mod tracker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::{TrackBuilder, DEFAULT_MAX_ALTERNATE_PATHS};
pub use error::{Result, RoutingError};
pub use events::{event_channel, ControllerEvent, EventReceiver, EventSender};
pub use link_state::{LinkCounters, LinkStateAggregator, ReliabilityReport, DEFAULT_WINDOW};
pub use manager::TrackManager;
pub use route::{RouteProvider, StaticRoutes};
pub use topology::{NeighborReport, TopologyGraph, TopologyStore, NO_ROUTE_PREFERENCE};
pub use track::{ArcKind, CellRequest, Track, TrackArc, TrackState};
pub use tracker::{
    BitmapGrant, FeedbackOutcome, ReplicationMode, Tracker, TrackerConfig, TrackerStats,
    DEFAULT_FEEDBACK_TIMEOUT,
};
