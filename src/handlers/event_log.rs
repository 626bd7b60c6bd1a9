// Roel Kluin, 2023, GPL v3

use super::{GraphEvent, GraphHandler};
use crate::error::HandlerFault;
use crate::graph::Graph;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Logs every event. Registered by `Graph::new` when event tracing is on.
#[derive(Default)]
pub struct EventLog {
    seen: AtomicU64,
}

impl EventLog {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl GraphHandler for EventLog {
    fn name(&self) -> &str {
        "event_log"
    }

    fn handle(&self, _graph: &Graph, event: &GraphEvent) -> Result<(), HandlerFault> {
        let n = self.seen.fetch_add(1, Ordering::Relaxed);
        debug!(n, %event, "graph event");
        Ok(())
    }
}
