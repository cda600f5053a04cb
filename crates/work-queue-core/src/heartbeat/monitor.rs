use super::ResetHeartBeat;
use crate::error::QueueError;
use crate::monitor::{MonitorTask, QueueMonitor};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
impl MonitorTask for ResetHeartBeat {
    fn name(&self) -> &'static str {
        "heart_beat_reset"
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        Ok(self.reset(cancel).await?.len() as u64)
    }
}

/// Runs heartbeat reset sweeps on a fixed interval
pub struct HeartBeatMonitor {
    monitor: QueueMonitor,
}

impl HeartBeatMonitor {
    pub fn new(reset: Arc<ResetHeartBeat>, monitor_time: Duration) -> Self {
        Self {
            monitor: QueueMonitor::new(reset, monitor_time),
        }
    }

    pub fn start(&self) -> Result<(), QueueError> {
        self.monitor.start()
    }

    pub async fn stop(&self) {
        self.monitor.stop().await
    }

    pub fn cancel(&self) {
        self.monitor.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }
}
