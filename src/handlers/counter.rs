// Roel Kluin, 2023, GPL v3

use super::{EventMask, GraphEvent, GraphHandler};
use crate::error::HandlerFault;
use crate::graph::Graph;
use std::sync::atomic::{AtomicI64, Ordering};

/// Live entity counts kept from Adding and Deleting events alone.
#[derive(Default)]
pub struct EntityCounter {
    vertices: AtomicI64,
    edges: AtomicI64,
}

impl EntityCounter {
    pub fn vertices(&self) -> i64 {
        self.vertices.load(Ordering::Acquire)
    }
    pub fn edges(&self) -> i64 {
        self.edges.load(Ordering::Acquire)
    }
}

impl GraphHandler for EntityCounter {
    fn name(&self) -> &str {
        "entity_counter"
    }

    fn events(&self) -> EventMask {
        EventMask::ADDING_VERTEX
            | EventMask::DELETING_VERTEX
            | EventMask::ADDING_EDGE
            | EventMask::DELETING_EDGE
    }

    fn handle(&self, _graph: &Graph, event: &GraphEvent) -> Result<(), HandlerFault> {
        let (counter, delta) = match event {
            GraphEvent::AddingVertex(_) => (&self.vertices, 1),
            GraphEvent::DeletingVertex(_) => (&self.vertices, -1),
            GraphEvent::AddingEdge(_) => (&self.edges, 1),
            GraphEvent::DeletingEdge(_) => (&self.edges, -1),
            _ => return Ok(()),
        };
        let prev = counter.fetch_add(delta, Ordering::AcqRel);
        if prev + delta < 0 {
            return Err(HandlerFault(format!("{event} drops the count below zero")));
        }
        Ok(())
    }
}
