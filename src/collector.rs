//! Ingest and report loops around a shared [`Ldm`].

use crate::ldm::{CamFilter, Ldm, LdmError};
use crate::time;
use crate::transport::{CamReceiver, TransportConfig, TransportError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid report filter: {0}")]
    Filter(#[from] LdmError),
}

/// Statistics for the collector.
#[derive(Debug, Default)]
pub struct CollectorStats {
    pub datagrams_received: AtomicU64,
    pub cams_stored: AtomicU64,
    pub errors: AtomicU64,
    pub bytes_received: AtomicU64,
    pub reports: AtomicU64,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            cams_stored: self.cams_stored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            reports: self.reports.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub cams_stored: u64,
    pub errors: u64,
    pub bytes_received: u64,
    pub reports: u64,
}

/// Configuration for the collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Socket settings for the ingest loop
    pub transport: TransportConfig,
    /// Interval between two reports
    pub report_interval: Duration,
    /// Which stations a report lists
    pub report_filter: CamFilter,
    /// How often the ingest loop checks the running flag while idle
    pub poll_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            report_interval: Duration::from_secs(2),
            report_filter: CamFilter::default(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// One line per station matching `filter`, sorted by station id.
pub fn report_lines(ldm: &Ldm, filter: &CamFilter) -> Result<Vec<String>, LdmError> {
    let now = time::now_its();
    let mut cams: Vec<_> = ldm.iter_filtered_at(filter, now)?.collect();
    cams.sort_unstable_by_key(|c| c.station_id());

    Ok(cams
        .iter()
        .map(|cam| {
            format!(
                "station_id={}, age={}ms : {}",
                cam.station_id(),
                cam.age_at(now),
                cam
            )
        })
        .collect())
}

/// Receives CAMs into the LDM and periodically reports its content.
pub struct Collector {
    ldm: Arc<Ldm>,
    config: CollectorConfig,
    stats: Arc<CollectorStats>,
    running: Arc<AtomicBool>,
}

impl Collector {
    /// Create a new collector writing into `ldm`.
    pub fn new(ldm: Arc<Ldm>, config: CollectorConfig) -> Result<Self, CollectorError> {
        // reject bad filters before anything is bound
        config.report_filter.validate()?;

        Ok(Self {
            ldm,
            config,
            stats: Arc::new(CollectorStats::new()),
            // cleared by `stop`, never set again
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn ldm(&self) -> Arc<Ldm> {
        Arc::clone(&self.ldm)
    }

    /// Get a reference to the collector stats.
    pub fn stats(&self) -> Arc<CollectorStats> {
        Arc::clone(&self.stats)
    }

    /// Check if the collector has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the collector. A stop issued before [`Collector::run`] makes it
    /// return without receiving anything.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Shared stop flag, usable after the collector moved into a task.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until stopped. A collector runs at most once.
    pub async fn run(&self) -> Result<(), CollectorError> {
        self.run_with_ready(None).await
    }

    /// Run until stopped, sending the bound address on `ready` once the
    /// socket is listening.
    pub async fn run_with_ready(
        &self,
        ready: Option<oneshot::Sender<SocketAddr>>,
    ) -> Result<(), CollectorError> {
        if !self.is_running() {
            tracing::debug!("Collector stopped before start");
            return Ok(());
        }

        let mut receiver = CamReceiver::bind(&self.config.transport).await?;

        if let Some(tx) = ready {
            let _ = tx.send(receiver.local_addr()?);
        }

        let report_handle = self.spawn_report_task();

        let result = self.ingest_loop(&mut receiver).await;

        self.running.store(false, Ordering::SeqCst);
        let _ = report_handle.await;

        result
    }

    async fn ingest_loop(&self, receiver: &mut CamReceiver) -> Result<(), CollectorError> {
        while self.running.load(Ordering::Relaxed) {
            let received =
                match tokio::time::timeout(self.config.poll_interval, receiver.recv()).await {
                    Ok(r) => r,
                    // idle, go check the running flag
                    Err(_) => continue,
                };

            match received {
                Ok((cam, len)) => {
                    self.stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
                    self.stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);

                    tracing::trace!("associated {} with {}", cam, cam.station_id());
                    self.ldm.insert(cam);
                    self.stats.cams_stored.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.is_datagram_error() => {
                    self.stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Dropping datagram: {}", e);
                }
                Err(e) => {
                    tracing::error!("Receive error: {}", e);
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    fn spawn_report_task(&self) -> tokio::task::JoinHandle<()> {
        let ldm = Arc::clone(&self.ldm);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);
        let filter = self.config.report_filter;
        let report_interval = self.config.report_interval;
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(report_interval);
            // the first tick completes immediately
            interval.tick().await;

            while running.load(Ordering::Relaxed) {
                // wake up regularly so a stop is noticed between reports
                if tokio::time::timeout(poll_interval, interval.tick())
                    .await
                    .is_err()
                {
                    continue;
                }

                match report_lines(&ldm, &filter) {
                    Ok(lines) => {
                        tracing::debug!("Reporting {} of {} stations", lines.len(), ldm.len());
                        for line in lines {
                            tracing::info!("{}", line);
                        }
                        stats.reports.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!("Report error: {}", e);
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
    }
}

/// Builder for creating a Collector with custom configuration.
pub struct CollectorBuilder {
    ldm: Option<Arc<Ldm>>,
    config: CollectorConfig,
}

impl CollectorBuilder {
    pub fn new() -> Self {
        Self {
            ldm: None,
            config: CollectorConfig::default(),
        }
    }

    /// Share an existing map instead of creating an empty one.
    pub fn ldm(mut self, ldm: Arc<Ldm>) -> Self {
        self.ldm = Some(ldm);
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.transport.bind_addr = addr;
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.config.report_interval = interval;
        self
    }

    pub fn report_filter(mut self, filter: CamFilter) -> Self {
        self.config.report_filter = filter;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn build(self) -> Result<Collector, CollectorError> {
        let ldm = self.ldm.unwrap_or_default();
        Collector::new(ldm, self.config)
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
