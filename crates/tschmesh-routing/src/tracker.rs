//! Per-track runtime state
//!
//! A tracker serves bitmaps for every destination its track reaches and
//! reacts to failure feedback by steering affected destinations onto track
//! paths that avoid the failed edges.

use crate::builder::DEFAULT_MAX_ALTERNATE_PATHS;
use crate::error::{Result, RoutingError};
use crate::events::{ControllerEvent, EventSender};
use crate::paths;
use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tschmesh_protocol::{BitIndexMap, Bitmap, Edge, Eui64, FeedbackReport, TrackId};

/// Default time without feedback before rerouted paths heal
pub const DEFAULT_FEEDBACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Which track edges a bitmap enables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// One path per destination
    #[default]
    SinglePath,
    /// Every track edge
    FullTrack,
}

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub replication: ReplicationMode,
    pub feedback_timeout: Duration,
    pub self_heal: bool,
    pub max_alternate_paths: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            replication: ReplicationMode::SinglePath,
            feedback_timeout: DEFAULT_FEEDBACK_TIMEOUT,
            self_heal: true,
            max_alternate_paths: DEFAULT_MAX_ALTERNATE_PATHS,
        }
    }
}

/// Tracker counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub sent: u64,
    pub received: u64,
    pub failure_reports: u64,
    pub reroutes: u64,
    pub stale_reports: u64,
}

impl TrackerStats {
    /// Share of sent bitmaps that drew no failure report
    pub fn delivery_ratio(&self) -> f64 {
        if self.sent == 0 {
            return 1.0;
        }
        (1.0 - self.failure_reports as f64 / self.sent as f64).clamp(0.0, 1.0)
    }
}

/// A bitmap handed out for one destination
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapGrant {
    pub track_id: TrackId,
    pub destination: Eui64,
    pub bitmap: Bitmap,
    /// Bitmaps sent on this track so far, this one included
    pub sequence: u64,
}

/// What a feedback report changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackOutcome {
    pub failed: BTreeSet<Edge>,
    /// Destinations switched to a new path
    pub rerouted: Vec<Eui64>,
    /// Destinations whose path changed since the report's bitmap went out
    pub stale: Vec<Eui64>,
    /// Destinations left on their path because no alternative survives
    pub exhausted: Vec<Eui64>,
}

#[derive(Debug, Clone)]
struct PathState {
    enabled: BTreeSet<Edge>,
    dispatched: Option<BTreeSet<Edge>>,
    rerouted: bool,
}

impl PathState {
    fn new(enabled: BTreeSet<Edge>) -> Self {
        PathState {
            enabled,
            dispatched: None,
            rerouted: false,
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    replication: ReplicationMode,
    paths: BTreeMap<Eui64, PathState>,
    stats: TrackerStats,
    last_feedback: Option<Instant>,
    last_activity: Instant,
}

/// Runtime state of one active track
pub struct Tracker {
    track: Track,
    bit_map: BitIndexMap,
    successors: paths::Adjacency,
    feedback_timeout: Duration,
    self_heal: bool,
    state: Mutex<TrackerState>,
    events: Option<EventSender>,
}

impl Tracker {
    /// Wrap a finalized track
    pub fn new(track: Track, config: &TrackerConfig, events: Option<EventSender>) -> Result<Self> {
        let bit_map = track
            .bit_map()
            .cloned()
            .ok_or_else(|| RoutingError::TrackBuild(format!("{} is not finalized", track.id())))?;
        let successors = track.successors();

        Ok(Tracker {
            track,
            bit_map,
            successors,
            feedback_timeout: config.feedback_timeout,
            self_heal: config.self_heal,
            state: Mutex::new(TrackerState {
                replication: config.replication,
                paths: BTreeMap::new(),
                stats: TrackerStats::default(),
                last_feedback: None,
                last_activity: Instant::now(),
            }),
            events,
        })
    }

    pub fn id(&self) -> TrackId {
        self.track.id()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Whether this tracker can serve `destination`
    pub fn serves(&self, destination: &Eui64) -> bool {
        *destination != self.track.root() && self.track.contains(destination)
    }

    /// Bitmap length of this track
    pub fn bit_len(&self) -> usize {
        self.bit_map.bit_len()
    }

    /// Path a destination starts on, and returns to when healing
    pub fn default_path(
        &self,
        destination: &Eui64,
        replication: ReplicationMode,
    ) -> Result<BTreeSet<Edge>> {
        if !self.serves(destination) {
            return Err(RoutingError::UnknownDestination(*destination));
        }
        if replication == ReplicationMode::FullTrack {
            return Ok(self.track.edges().map(|(edge, _)| *edge).collect());
        }
        if *destination == self.track.destination() {
            if let Some(edges) = self.track.route_edges() {
                return Ok(edges);
            }
        }
        self.track_path(destination, &HashSet::new())
            .ok_or(RoutingError::NoRoute(*destination))
    }

    fn track_path(&self, destination: &Eui64, avoid: &HashSet<Edge>) -> Option<BTreeSet<Edge>> {
        let path = paths::shortest_path(
            &self.successors,
            self.track.root(),
            *destination,
            &HashSet::new(),
            avoid,
        )?;
        Some(Edge::along(&path).into_iter().collect())
    }

    /// Bitmap for the current path to `destination`
    pub async fn get_bitmap(&self, destination: Eui64) -> Result<BitmapGrant> {
        let (grant, edges) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();
            state.last_activity = now;

            let heal = self.self_heal
                && state
                    .last_feedback
                    .is_some_and(|at| now.duration_since(at) > self.feedback_timeout);

            let replication = state.replication;
            if !state.paths.contains_key(&destination) {
                let initial = self.default_path(&destination, replication)?;
                state.paths.insert(destination, PathState::new(initial));
            }
            let path = state
                .paths
                .get_mut(&destination)
                .ok_or(RoutingError::UnknownDestination(destination))?;
            if heal && path.rerouted {
                path.enabled = self.default_path(&destination, replication)?;
                path.rerouted = false;
                info!("{}: path to {} healed", self.track.id(), destination);
            }

            let bitmap = self.bit_map.encode(&path.enabled)?;
            path.dispatched = Some(path.enabled.clone());
            let edges = path.enabled.clone();

            state.stats.sent += 1;
            let grant = BitmapGrant {
                track_id: self.track.id(),
                destination,
                bitmap,
                sequence: state.stats.sent,
            };
            (grant, edges)
        };

        debug!(
            "{}: bitmap {} for {} (seq {})",
            grant.track_id, grant.bitmap, destination, grant.sequence
        );
        self.emit(ControllerEvent::EdgesEnabled {
            track_id: grant.track_id,
            destination,
            edges,
            bitmap: grant.bitmap.clone(),
            sequence: grant.sequence,
        });
        Ok(grant)
    }

    /// Apply a failure report from a mote
    pub async fn on_failure_feedback(&self, report: &FeedbackReport) -> Result<FeedbackOutcome> {
        let bitmap = report.bitmap(self.bit_map.bit_len())?;
        let failed = self.bit_map.decode(&bitmap)?;
        let avoid: HashSet<Edge> = failed.iter().copied().collect();

        let mut outcome = FeedbackOutcome {
            failed: failed.clone(),
            ..Default::default()
        };
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();
            state.last_activity = now;
            state.last_feedback = Some(now);
            state.stats.received += 1;
            if !failed.is_empty() {
                state.stats.failure_reports += 1;
            }

            for (destination, path) in state.paths.iter_mut() {
                let Some(dispatched) = &path.dispatched else {
                    continue;
                };
                if *dispatched != path.enabled {
                    debug!(
                        "{}: stale feedback from mote {:04x} for {}",
                        self.track.id(),
                        report.mote_id,
                        destination
                    );
                    outcome.stale.push(*destination);
                    continue;
                }
                if path.enabled.is_disjoint(&failed) {
                    continue;
                }

                match self.track_path(destination, &avoid) {
                    Some(new_path) => {
                        info!(
                            "{}: rerouting {} around {} failed edges",
                            self.track.id(),
                            destination,
                            failed.len()
                        );
                        path.enabled = new_path;
                        path.rerouted = true;
                        outcome.rerouted.push(*destination);
                    }
                    None => {
                        warn!(
                            "{}: no path to {} avoids the failed edges, keeping current path",
                            self.track.id(),
                            destination
                        );
                        outcome.exhausted.push(*destination);
                    }
                }
            }

            state.stats.reroutes += outcome.rerouted.len() as u64;
            if !outcome.stale.is_empty() {
                state.stats.stale_reports += 1;
            }
        }

        self.emit(ControllerEvent::EdgesFailed {
            track_id: self.track.id(),
            mote_id: report.mote_id,
            edges: failed,
            bitmap,
        });
        Ok(outcome)
    }

    /// Switch replication mode; every destination restarts on its default path
    pub async fn set_replication(&self, mode: ReplicationMode) {
        let mut state = self.state.lock().await;
        if state.replication != mode {
            state.replication = mode;
            state.paths.clear();
            info!("{}: replication set to {:?}", self.track.id(), mode);
        }
    }

    pub async fn replication(&self) -> ReplicationMode {
        self.state.lock().await.replication
    }

    /// Currently enabled edges towards `destination`
    pub async fn enabled_path(&self, destination: &Eui64) -> Option<BTreeSet<Edge>> {
        self.state
            .lock()
            .await
            .paths
            .get(destination)
            .map(|path| path.enabled.clone())
    }

    pub async fn stats(&self) -> TrackerStats {
        self.state.lock().await.stats.clone()
    }

    /// Time since the last bitmap or feedback
    pub async fn idle_for(&self) -> Duration {
        self.state.lock().await.last_activity.elapsed()
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("{}: event receiver dropped", self.track.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TrackBuilder;
    use crate::events::event_channel;
    use crate::fixtures::*;
    use tschmesh_protocol::Asn;

    fn ladder_track() -> Track {
        let topology = ladder_topology();
        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        let mut track = Track::new(TrackId::from_u8(1), ladder_route()).unwrap();
        builder.build(&mut track).unwrap();
        track.finalize().unwrap();
        track
    }

    fn ladder_tracker(config: TrackerConfig) -> Tracker {
        Tracker::new(ladder_track(), &config, None).unwrap()
    }

    fn feedback(bitmap: &str) -> FeedbackReport {
        let bitmap: Bitmap = bitmap.parse().unwrap();
        FeedbackReport::new(TrackId::from_u8(1), 0x9ec3, Asn::default(), bitmap.to_bytes())
    }

    #[tokio::test]
    async fn test_default_bitmap_follows_route() {
        let tracker = ladder_tracker(TrackerConfig::default());
        let grant = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "00100100101");
        assert_eq!(grant.sequence, 1);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_idempotent() {
        let tracker = ladder_tracker(TrackerConfig::default());
        let first = tracker.get_bitmap(ec3()).await.unwrap();
        let second = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(first.bitmap, second.bitmap);
        assert_eq!(second.sequence, 2);
        assert_eq!(tracker.stats().await.sent, 2);
    }

    #[tokio::test]
    async fn test_failure_reroutes_around_failed_bits() {
        let tracker = ladder_tracker(TrackerConfig::default());
        let before = tracker.get_bitmap(ec3()).await.unwrap();

        let outcome = tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();
        assert_eq!(outcome.rerouted, vec![ec3()]);

        let after = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(after.bitmap.to_string(), "10010010010");
        assert!(!after.bitmap.intersects(&before.bitmap));

        let stats = tracker.stats().await;
        assert_eq!(stats.reroutes, 1);
        assert_eq!(stats.failure_reports, 1);
        assert_eq!(stats.received, 1);
    }

    #[tokio::test]
    async fn test_stale_feedback_discarded() {
        let tracker = ladder_tracker(TrackerConfig::default());
        tracker.get_bitmap(ec3()).await.unwrap();
        tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();
        let rerouted = tracker.enabled_path(&ec3()).await.unwrap();

        // A second report for the old bitmap arrives before a new one is sent
        let outcome = tracker
            .on_failure_feedback(&feedback("00000000101"))
            .await
            .unwrap();
        assert_eq!(outcome.stale, vec![ec3()]);
        assert!(outcome.rerouted.is_empty());
        assert_eq!(tracker.enabled_path(&ec3()).await.unwrap(), rerouted);
        assert_eq!(tracker.stats().await.stale_reports, 1);
    }

    #[tokio::test]
    async fn test_exhausted_reroute_keeps_path() {
        let tracker = ladder_tracker(TrackerConfig::default());
        let before = tracker.get_bitmap(ec3()).await.unwrap();

        // Both links into EC3 failed
        let outcome = tracker
            .on_failure_feedback(&feedback("00000000011"))
            .await
            .unwrap();
        assert_eq!(outcome.exhausted, vec![ec3()]);

        let after = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(after.bitmap, before.bitmap);
    }

    #[tokio::test]
    async fn test_unrelated_failure_ignored() {
        let tracker = ladder_tracker(TrackerConfig::default());
        tracker.get_bitmap(ec3()).await.unwrap();
        // ED9 -> F02 is not on the default path
        let outcome = tracker
            .on_failure_feedback(&feedback("10000000000"))
            .await
            .unwrap();
        assert!(outcome.rerouted.is_empty());
        assert!(outcome.stale.is_empty());
    }

    #[tokio::test]
    async fn test_short_feedback_rejected() {
        let tracker = ladder_tracker(TrackerConfig::default());
        let report = FeedbackReport::new(TrackId::from_u8(1), 1, Asn::default(), vec![0xFF]);
        assert!(matches!(
            tracker.on_failure_feedback(&report).await,
            Err(RoutingError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_heal_after_timeout() {
        let tracker = ladder_tracker(TrackerConfig::default());
        tracker.get_bitmap(ec3()).await.unwrap();
        tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();

        let within = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(within.bitmap.to_string(), "10010010010");

        tokio::time::advance(Duration::from_secs(6)).await;
        let healed = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(healed.bitmap.to_string(), "00100100101");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heal_when_disabled() {
        let config = TrackerConfig {
            self_heal: false,
            ..Default::default()
        };
        let tracker = ladder_tracker(config);
        tracker.get_bitmap(ec3()).await.unwrap();
        tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let grant = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "10010010010");
    }

    #[tokio::test]
    async fn test_full_track_replication() {
        let config = TrackerConfig {
            replication: ReplicationMode::FullTrack,
            ..Default::default()
        };
        let tracker = ladder_tracker(config);
        let grant = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "11111111111");

        // Failure collapses to one surviving path
        tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();
        let grant = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "10010010010");

        tracker.set_replication(ReplicationMode::SinglePath).await;
        let grant = tracker.get_bitmap(ec3()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "00100100101");
    }

    #[tokio::test]
    async fn test_intermediate_destination() {
        let tracker = ladder_tracker(TrackerConfig::default());
        // ED8 is on the route: ED9 -> F4A -> ED8
        let grant = tracker.get_bitmap(ed8()).await.unwrap();
        assert_eq!(grant.bitmap.to_string(), "00100100000");

        assert!(matches!(
            tracker.get_bitmap(ed9()).await,
            Err(RoutingError::UnknownDestination(_))
        ));
        assert!(matches!(
            tracker.get_bitmap(node(99)).await,
            Err(RoutingError::UnknownDestination(_))
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let (tx, mut rx) = event_channel();
        let tracker = Tracker::new(ladder_track(), &TrackerConfig::default(), Some(tx)).unwrap();

        tracker.get_bitmap(ec3()).await.unwrap();
        match rx.recv().await {
            Some(ControllerEvent::EdgesEnabled { edges, sequence, .. }) => {
                assert_eq!(edges.len(), 4);
                assert_eq!(sequence, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        tracker
            .on_failure_feedback(&feedback("00100100101"))
            .await
            .unwrap();
        match rx.recv().await {
            Some(ControllerEvent::EdgesFailed { edges, mote_id, .. }) => {
                assert_eq!(edges.len(), 4);
                assert_eq!(mote_id, 0x9ec3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_delivery_ratio() {
        let mut stats = TrackerStats::default();
        assert_eq!(stats.delivery_ratio(), 1.0);
        stats.sent = 4;
        stats.failure_reports = 1;
        assert_eq!(stats.delivery_ratio(), 0.75);
    }

    #[test]
    fn test_unfinalized_track_rejected() {
        let track = Track::new(TrackId::from_u8(1), ladder_route()).unwrap();
        assert!(Tracker::new(track, &TrackerConfig::default(), None).is_err());
    }
}
