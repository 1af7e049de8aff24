use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use tschmesh_protocol::TrackId;
use tschmesh_routing::{CellRequest, TrackArc};

/// Receives the cells a new track needs
#[async_trait]
pub trait ScheduleInstaller: Send + Sync {
    async fn install_track(&self, track_id: TrackId, arcs: &[TrackArc]) -> Result<()>;
}

/// Flatten arcs into per-edge cell requests
pub fn cell_requests(track_id: TrackId, arcs: &[TrackArc]) -> Vec<CellRequest> {
    arcs.iter()
        .flat_map(|arc| arc.cell_requests(track_id))
        .collect()
}

/// Installer that only logs the requested cells
#[derive(Debug, Default)]
pub struct LoggingInstaller;

#[async_trait]
impl ScheduleInstaller for LoggingInstaller {
    async fn install_track(&self, track_id: TrackId, arcs: &[TrackArc]) -> Result<()> {
        let cells = cell_requests(track_id, arcs);
        info!("Installing {}: {} cells", track_id, cells.len());
        for cell in &cells {
            debug!(
                "  {} -> {} bit {}",
                cell.tx, cell.rx, cell.bit_index
            );
        }
        Ok(())
    }
}

/// Installer that keeps every request in memory
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    cells: RwLock<Vec<CellRequest>>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cells(&self) -> Vec<CellRequest> {
        self.cells.read().await.clone()
    }

    pub async fn cells_for(&self, track_id: TrackId) -> Vec<CellRequest> {
        self.cells
            .read()
            .await
            .iter()
            .filter(|cell| cell.track_id == track_id)
            .copied()
            .collect()
    }
}

#[async_trait]
impl ScheduleInstaller for RecordingInstaller {
    async fn install_track(&self, track_id: TrackId, arcs: &[TrackArc]) -> Result<()> {
        self.cells
            .write()
            .await
            .extend(cell_requests(track_id, arcs));
        Ok(())
    }
}
