use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::monitor::LinkStateMonitor;
use crate::schedule::ScheduleInstaller;

use tschmesh_protocol::{Eui64, FeedbackReport};
use tschmesh_routing::{
    BitmapGrant, ControllerEvent, EventReceiver, FeedbackOutcome, NeighborReport, TopologyStore,
    TrackManager,
};

/// Input arriving from the mesh
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A mote's ranked parents and children
    Neighbors(NeighborReport),
    /// A mote announcing whether it is a DAG root
    RootInfo { node: Eui64, is_root: bool },
    /// Failure bitmap reported by a mote
    Feedback(FeedbackReport),
}

/// Track controller orchestrator
pub struct Controller {
    config: Config,
    topology: Arc<TopologyStore>,
    manager: Arc<TrackManager>,
    monitor: Arc<LinkStateMonitor>,
    installer: Arc<dyn ScheduleInstaller>,
    events_rx: Mutex<Option<EventReceiver>>,
    shutdown_tx: broadcast::Sender<()>,
    pump_task: RwLock<Option<JoinHandle<()>>>,
}

impl Controller {
    pub async fn new(config: Config, installer: Arc<dyn ScheduleInstaller>) -> Result<Self> {
        info!("Initializing controller components...");

        let topology = Arc::new(TopologyStore::new());
        let (events_tx, events_rx) = TrackManager::create_event_channel();

        let mut manager = TrackManager::new(
            topology.clone(),
            topology.clone(),
            config.controller.tracker_config(),
        );
        manager.set_event_channel(events_tx.clone());
        for root in &config.roots {
            manager.register_root(*root, true).await;
        }
        info!(
            "✓ Track manager initialized ({} roots, {:?})",
            config.roots.len(),
            config.controller.replication
        );

        let monitor = LinkStateMonitor::new(config.aggregator.window(), events_tx);
        info!("✓ Link-state monitor initialized");

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        Ok(Self {
            config,
            topology,
            manager: Arc::new(manager),
            monitor: Arc::new(monitor),
            installer,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown_tx,
            pump_task: RwLock::new(None),
        })
    }

    /// Start the monitor and the event pump
    pub async fn start(&self) -> Result<()> {
        let mut events_rx = self
            .events_rx
            .lock()
            .await
            .take()
            .context("Controller already started")?;

        self.monitor.start().await?;

        let topology = Arc::clone(&self.topology);
        let monitor = Arc::clone(&self.monitor);
        let installer = Arc::clone(&self.installer);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Event pump shutting down");
                        break;
                    }
                    event = events_rx.recv() => match event {
                        Some(event) => {
                            Self::dispatch(event, &topology, &monitor, installer.as_ref()).await;
                        }
                        None => break,
                    }
                }
            }
        });
        *self.pump_task.write().await = Some(handle);

        info!("✓ Event pump running");
        Ok(())
    }

    async fn dispatch(
        event: ControllerEvent,
        topology: &TopologyStore,
        monitor: &LinkStateMonitor,
        installer: &dyn ScheduleInstaller,
    ) {
        match event {
            ControllerEvent::TrackInstalled {
                track_id, arcs, ..
            } => {
                if let Err(e) = installer.install_track(track_id, &arcs).await {
                    error!("Failed to install {}: {}", track_id, e);
                }
            }
            ControllerEvent::EdgesEnabled { edges, .. } => {
                monitor.record_enabled(&edges).await;
            }
            ControllerEvent::EdgesFailed { edges, .. } => {
                monitor.record_failed(&edges).await;
            }
            ControllerEvent::ReliabilityUpdated(report) => {
                topology.apply_reliability(&report).await;
            }
        }
    }

    /// Apply one inbound mesh event
    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<Option<FeedbackOutcome>> {
        match event {
            InboundEvent::Neighbors(report) => {
                self.topology.update_neighbors(report).await;
                Ok(None)
            }
            InboundEvent::RootInfo { node, is_root } => {
                self.manager.register_root(node, is_root).await;
                Ok(None)
            }
            InboundEvent::Feedback(report) => {
                let outcome = self
                    .manager
                    .feed_bits(&report)
                    .await
                    .with_context(|| format!("Feedback from mote {:04x}", report.mote_id))?;
                if !outcome.exhausted.is_empty() {
                    warn!(
                        "{}: {} destinations left without a surviving path",
                        report.track_id,
                        outcome.exhausted.len()
                    );
                }
                Ok(Some(outcome))
            }
        }
    }

    /// Bitmap for a packet towards `destination`
    pub async fn get_bitmap(&self, destination: Eui64) -> Result<BitmapGrant> {
        self.manager
            .get_bitmap(destination)
            .await
            .with_context(|| format!("No bitmap for {}", destination))
    }

    pub fn manager(&self) -> &Arc<TrackManager> {
        &self.manager
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    pub fn monitor(&self) -> &Arc<LinkStateMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        info!("═══════════════════════════════════════════════");
        info!("  tschnode is now running");
        info!("═══════════════════════════════════════════════");
        info!("  Config: {}", self.config.config_path().display());
        info!("  Replication: {:?}", self.config.controller.replication);
        info!("  Reliability window: {}s", self.config.aggregator.window_secs);
        info!("═══════════════════════════════════════════════");

        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");

        self.shutdown().await;
        Ok(())
    }

    /// Stop the event pump and the monitor
    pub async fn shutdown(&self) {
        info!("Shutting down controller...");
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.pump_task.write().await.take() {
            let _ = handle.await;
        }

        self.monitor.shutdown().await;
        info!("Shutdown complete");
    }
}
