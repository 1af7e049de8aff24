//! Routing error types

use thiserror::Error;
use tschmesh_protocol::{Eui64, TrackId};

/// Track-controller errors
///
/// Every variant is scoped to a single destination or track; none of them
/// leaves shared topology or other tracks in a modified state.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("No route to destination {0}")]
    NoRoute(Eui64),

    #[error("No DAG root registered")]
    NoDagRoot,

    #[error("Unknown destination: {0}")]
    UnknownDestination(Eui64),

    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    #[error("Track build failed: {0}")]
    TrackBuild(String),

    #[error("Bitmap error: {0}")]
    Protocol(#[from] tschmesh_protocol::ProtocolError),
}

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
