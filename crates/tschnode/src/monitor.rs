use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info};
use tschmesh_protocol::Edge;
use tschmesh_routing::{ControllerEvent, EventSender, LinkStateAggregator, ReliabilityReport};

/// Control messages for a running monitor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Discard the current window and restart the timer
    Reset,
    /// Close the current window now
    RollNow(oneshot::Sender<ReliabilityReport>),
}

/// Link-state monitor
///
/// Counts enabled and failed edges and publishes a reliability estimate at
/// the end of every window.
pub struct LinkStateMonitor {
    aggregator: Arc<RwLock<LinkStateAggregator>>,
    events: EventSender,
    control_tx: mpsc::UnboundedSender<MonitorCommand>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<MonitorCommand>>>,
    shutdown_tx: broadcast::Sender<()>,
    monitor_task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl LinkStateMonitor {
    pub fn new(window: Duration, events: EventSender) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        Self {
            aggregator: Arc::new(RwLock::new(LinkStateAggregator::new(window))),
            events,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            shutdown_tx,
            monitor_task: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_enabled(&self, edges: &BTreeSet<Edge>) {
        self.aggregator.write().await.record_enabled(edges);
    }

    pub async fn record_failed(&self, edges: &BTreeSet<Edge>) {
        self.aggregator.write().await.record_failed(edges);
    }

    /// Reliability of the edges seen so far in this window
    pub async fn estimate(&self) -> BTreeMap<Edge, f64> {
        self.aggregator.read().await.estimate()
    }

    /// Start the rollover loop
    pub async fn start(&self) -> Result<()> {
        let mut control_rx = self
            .control_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Link-state monitor already started"))?;

        let aggregator = Arc::clone(&self.aggregator);
        let events = self.events.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let window = aggregator.read().await.window();
        info!("Starting link-state monitor (window: {}s)", window.as_secs());

        let first_rollover = Instant::now() + window;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(first_rollover, window);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Link-state monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        Self::roll(&aggregator, &events).await;
                    }
                    command = control_rx.recv() => match command {
                        Some(MonitorCommand::Reset) => {
                            aggregator.write().await.reset();
                            ticker.reset();
                            debug!("Link-state window reset");
                        }
                        Some(MonitorCommand::RollNow(reply)) => {
                            let report = Self::roll(&aggregator, &events).await;
                            ticker.reset();
                            let _ = reply.send(report);
                        }
                        None => break,
                    }
                }
            }
        });

        *self.monitor_task.write().await = Some(handle);
        Ok(())
    }

    async fn roll(
        aggregator: &RwLock<LinkStateAggregator>,
        events: &EventSender,
    ) -> ReliabilityReport {
        let report = aggregator.write().await.rollover();
        if events
            .send(ControllerEvent::ReliabilityUpdated(report.clone()))
            .is_err()
        {
            debug!("Reliability update dropped, no event receiver");
        }
        report
    }

    /// Discard the current window and restart its timer
    pub fn reset(&self) -> Result<()> {
        self.control_tx
            .send(MonitorCommand::Reset)
            .map_err(|_| anyhow!("Link-state monitor is not running"))
    }

    /// Close the current window immediately
    pub async fn roll_now(&self) -> Result<ReliabilityReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(MonitorCommand::RollNow(reply_tx))
            .map_err(|_| anyhow!("Link-state monitor is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("Link-state monitor stopped before rolling"))
    }

    /// Stop the rollover loop and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.monitor_task.write().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tschmesh_protocol::Eui64;
    use tschmesh_routing::event_channel;

    fn edge(a: u8, b: u8) -> Edge {
        Edge::new(
            Eui64::from_bytes([0, 0, 0, 0, 0, 0, 0, a]),
            Eui64::from_bytes([0, 0, 0, 0, 0, 0, 0, b]),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollover_publishes_report() {
        let (tx, mut rx) = event_channel();
        let monitor = LinkStateMonitor::new(Duration::from_secs(600), tx);
        monitor.start().await.unwrap();

        let edges: BTreeSet<Edge> = [edge(1, 2)].into_iter().collect();
        monitor.record_enabled(&edges).await;
        monitor.record_enabled(&edges).await;
        monitor.record_failed(&edges).await;

        tokio::time::advance(Duration::from_secs(601)).await;
        match rx.recv().await {
            Some(ControllerEvent::ReliabilityUpdated(report)) => {
                assert_eq!(report.window, 1);
                assert_eq!(report.reliability[&edge(1, 2)], 0.5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(monitor.estimate().await.is_empty());

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_roll_now() {
        let (tx, _rx) = event_channel();
        let monitor = LinkStateMonitor::new(Duration::from_secs(600), tx);
        monitor.start().await.unwrap();

        let edges: BTreeSet<Edge> = [edge(1, 2), edge(2, 3)].into_iter().collect();
        monitor.record_enabled(&edges).await;

        let report = monitor.roll_now().await.unwrap();
        assert_eq!(report.reliability.len(), 2);
        assert!(report.reliability.values().all(|r| *r == 1.0));

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_discards_window() {
        let (tx, _rx) = event_channel();
        let monitor = LinkStateMonitor::new(Duration::from_secs(600), tx);
        monitor.start().await.unwrap();

        let edges: BTreeSet<Edge> = [edge(1, 2)].into_iter().collect();
        monitor.record_enabled(&edges).await;
        monitor.reset().unwrap();

        let report = monitor.roll_now().await.unwrap();
        assert!(report.reliability.is_empty());

        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (tx, _rx) = event_channel();
        let monitor = LinkStateMonitor::new(Duration::from_secs(600), tx);
        monitor.start().await.unwrap();
        assert!(monitor.start().await.is_err());
        monitor.shutdown().await;
    }
}
