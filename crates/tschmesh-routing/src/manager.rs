//! Track manager
//!
//! Owns the set of tracks, builds them lazily on the first request for an
//! uncovered destination and dispatches feedback to the owning tracker.

use crate::builder::TrackBuilder;
use crate::error::{Result, RoutingError};
use crate::events::{event_channel, ControllerEvent, EventReceiver, EventSender};
use crate::route::RouteProvider;
use crate::topology::TopologyStore;
use crate::track::Track;
use crate::tracker::{BitmapGrant, FeedbackOutcome, ReplicationMode, Tracker, TrackerConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use tschmesh_protocol::{Eui64, FeedbackReport, TrackId};

/// Track manager
pub struct TrackManager {
    topology: Arc<TopologyStore>,
    routes: Arc<dyn RouteProvider>,

    /// Registered DAG roots; the first is current
    roots: RwLock<Vec<Eui64>>,

    tracks: RwLock<BTreeMap<TrackId, Arc<Tracker>>>,

    /// Serializes track builds
    build_lock: Mutex<()>,

    config: RwLock<TrackerConfig>,

    events: Option<EventSender>,
}

impl TrackManager {
    pub fn new(
        topology: Arc<TopologyStore>,
        routes: Arc<dyn RouteProvider>,
        config: TrackerConfig,
    ) -> Self {
        TrackManager {
            topology,
            routes,
            roots: RwLock::new(Vec::new()),
            tracks: RwLock::new(BTreeMap::new()),
            build_lock: Mutex::new(()),
            config: RwLock::new(config),
            events: None,
        }
    }

    /// Set the channel events are published on
    ///
    /// Only trackers built afterwards publish on it.
    pub fn set_event_channel(&mut self, tx: EventSender) {
        self.events = Some(tx);
    }

    /// Create a channel for receiving controller events
    pub fn create_event_channel() -> (EventSender, EventReceiver) {
        event_channel()
    }

    /// Register or unregister a DAG root
    ///
    /// Returns whether the root set changed.
    pub async fn register_root(&self, node: Eui64, is_root: bool) -> bool {
        let mut roots = self.roots.write().await;
        let position = roots.iter().position(|r| *r == node);
        match (is_root, position) {
            (true, None) => {
                roots.push(node);
                info!("Registered DAG root {}", node);
                true
            }
            (false, Some(index)) => {
                roots.remove(index);
                info!("Unregistered DAG root {}", node);
                true
            }
            _ => false,
        }
    }

    pub async fn current_root(&self) -> Option<Eui64> {
        self.roots.read().await.first().copied()
    }

    pub async fn roots(&self) -> Vec<Eui64> {
        self.roots.read().await.clone()
    }

    /// First track able to serve `destination`
    async fn tracker_for(&self, destination: &Eui64) -> Option<Arc<Tracker>> {
        self.tracks
            .read()
            .await
            .values()
            .find(|tracker| tracker.serves(destination))
            .cloned()
    }

    /// Bitmap for `destination`, building a track first if none covers it
    pub async fn get_bitmap(&self, destination: Eui64) -> Result<BitmapGrant> {
        if let Some(tracker) = self.tracker_for(&destination).await {
            return tracker.get_bitmap(destination).await;
        }

        let root = self.current_root().await.ok_or(RoutingError::NoDagRoot)?;
        if destination == root {
            return Err(RoutingError::UnknownDestination(destination));
        }
        let mut route = self
            .routes
            .source_route(destination)
            .await
            .ok_or(RoutingError::NoRoute(destination))?;
        if route.last() != Some(&root) {
            route.push(root);
        }
        let snapshot = self.topology.snapshot().await;
        let config = self.config.read().await.clone();

        let (tracker, installed) = {
            let _build = self.build_lock.lock().await;
            match self.tracker_for(&destination).await {
                // Built by a concurrent request while we waited
                Some(tracker) => (tracker, None),
                None => {
                    let track_id = self.next_track_id().await?;
                    let mut track = Track::new(track_id, route)?;
                    let builder = TrackBuilder::new(&snapshot, config.max_alternate_paths);
                    let arcs = builder.build(&mut track)?;
                    let bit_len = track.finalize()?.bit_len();

                    let tracker = Arc::new(Tracker::new(track, &config, self.events.clone())?);
                    self.tracks.write().await.insert(track_id, tracker.clone());
                    info!(
                        "Installed {} from {} to {} ({} bits)",
                        track_id, root, destination, bit_len
                    );

                    let event = ControllerEvent::TrackInstalled {
                        track_id,
                        root,
                        destination,
                        arcs,
                    };
                    (tracker, Some(event))
                }
            }
        };

        if let Some(event) = installed {
            self.emit(event);
        }
        tracker.get_bitmap(destination).await
    }

    async fn next_track_id(&self) -> Result<TrackId> {
        let count = self.tracks.read().await.len();
        u8::try_from(count + 1)
            .map(TrackId::from_u8)
            .map_err(|_| RoutingError::TrackBuild("track ids exhausted".to_string()))
    }

    /// Hand a feedback report to the tracker that owns its track
    pub async fn feed_bits(&self, report: &FeedbackReport) -> Result<FeedbackOutcome> {
        let tracker = self
            .tracker(report.track_id)
            .await
            .ok_or(RoutingError::UnknownTrack(report.track_id))?;
        tracker.on_failure_feedback(report).await
    }

    /// Change replication for existing and future trackers
    pub async fn set_replication(&self, mode: ReplicationMode) {
        self.config.write().await.replication = mode;
        let trackers: Vec<Arc<Tracker>> = self.tracks.read().await.values().cloned().collect();
        for tracker in trackers {
            tracker.set_replication(mode).await;
        }
    }

    pub async fn replication(&self) -> ReplicationMode {
        self.config.read().await.replication
    }

    /// Drop every track; the next request rebuilds from current topology
    pub async fn clear_tracks(&self) {
        let mut tracks = self.tracks.write().await;
        debug!("Clearing {} tracks", tracks.len());
        tracks.clear();
    }

    pub async fn tracker(&self, track_id: TrackId) -> Option<Arc<Tracker>> {
        self.tracks.read().await.get(&track_id).cloned()
    }

    pub async fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.read().await.keys().copied().collect()
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}
