//! Monitor loop
//!
//! Collect → compare against the baseline → notify, once per interval.
//! The first successful collection only sets the baseline. After that the
//! baseline moves only when a notification goes out, so gradual drift is
//! measured against what subscribers last saw.

use crate::detector;
use crate::directory::UserDirectory;
use crate::error::Result;
use crate::metrics::{ClusterStatus, SnapshotCollector};
use crate::notifier::{DeliveryReport, NotificationSink};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What a single iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First observation, recorded without notifying.
    Baseline,
    Unchanged,
    Notified(DeliveryReport),
}

pub struct Monitor {
    collector: SnapshotCollector,
    directory: Box<dyn UserDirectory>,
    sink: NotificationSink,
    baseline: Option<ClusterStatus>,
    interval: Duration,
}

impl Monitor {
    /// `check_interval` must be non-zero.
    pub fn new(
        collector: SnapshotCollector,
        directory: Box<dyn UserDirectory>,
        sink: NotificationSink,
        check_interval: Duration,
    ) -> Self {
        Self {
            collector,
            directory,
            sink,
            baseline: None,
            interval: check_interval,
        }
    }

    pub fn baseline(&self) -> Option<&ClusterStatus> {
        self.baseline.as_ref()
    }

    /// Run until a non-recoverable error occurs.
    pub async fn run(mut self) -> Result<Infallible> {
        info!("Monitoring GPUs every {:?}", self.interval);

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            self.run_once().await?;
        }
    }

    /// One iteration with transient failures logged and swallowed.
    pub async fn run_once(&mut self) -> Result<()> {
        match self.tick().await {
            Ok(outcome) => {
                debug!("Tick finished: {:?}", outcome);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!("Tick skipped: {}", e);
                Ok(())
            }
            Err(e) => {
                error!("Monitor stopping: {}", e);
                Err(e)
            }
        }
    }

    /// One iteration, errors returned as-is.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let current = self.collector.collect().await?;

        let Some(previous) = self.baseline.as_ref() else {
            info!("Baseline recorded for {} device(s)", current.len());
            self.baseline = Some(current);
            return Ok(TickOutcome::Baseline);
        };

        if !detector::is_significant(previous, &current) {
            return Ok(TickOutcome::Unchanged);
        }

        let message = detector::render(&current, self.directory.as_ref());
        info!("Significant change detected, notifying subscribers");
        let report = self.sink.notify(&message).await?;

        self.baseline = Some(current);
        Ok(TickOutcome::Notified(report))
    }
}
