// Roel Kluin, 2023, GPL v3

use super::{EventMask, GraphEvent, GraphHandler};
use crate::error::HandlerFault;
use crate::graph::Graph;
use crate::ids::VertexId;
use crossbeam_queue::SegQueue;

/// Work queued from inside a handler, for the caller to run after the mutation returns.
pub struct DeferredQueue<T> {
    queue: SegQueue<T>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        DeferredQueue {
            queue: SegQueue::new(),
        }
    }
}

impl<T> DeferredQueue<T> {
    pub fn push(&self, item: T) {
        self.queue.push(item)
    }
    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.queue.pop())
    }
}

/// Queues both ends of every deleted edge: candidates for compression once the deleting pass
/// is done.
#[derive(Default)]
pub struct CompressionQueue {
    pub queue: DeferredQueue<VertexId>,
}

impl GraphHandler for CompressionQueue {
    fn name(&self) -> &str {
        "compression_queue"
    }

    fn events(&self) -> EventMask {
        EventMask::DELETING_EDGE
    }

    fn handle(&self, graph: &Graph, event: &GraphEvent) -> Result<(), HandlerFault> {
        if let GraphEvent::DeletingEdge(e) = event {
            let (from, to) = graph
                .endpoints(*e)
                .map_err(|err| HandlerFault(format!("deleting {e}: {err}")))?;
            self.queue.push(from);
            if to != from {
                self.queue.push(to);
            }
        }
        Ok(())
    }
}
