// Roel Kluin, 2023, GPL v3

//! Observers of structural change.
//!
//! Every mutation ends in one ordered batch of events: additions, then the composite event of
//! the operation, then deletions. Batches are delivered in the order the mutations took effect,
//! one batch at a time, to every handler in registration order.

pub mod counter;
pub mod coverage;
pub mod deferred;
pub mod event_log;

use crate::error::{GraphError, HandlerFault, Result};
use crate::graph::Graph;
use crate::ids::{EdgeId, VertexId};
use parking_lot::{Condvar, Mutex, RwLock};
use smallvec::SmallVec;
use std::cell::Cell;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use counter::EntityCounter;
pub use coverage::CoverageIndex;
pub use deferred::{CompressionQueue, DeferredQueue};
pub use event_log::EventLog;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    AddingVertex(VertexId),
    DeletingVertex(VertexId),
    AddingEdge(EdgeId),
    DeletingEdge(EdgeId),
    /// `old` edges, in path order, became `new`.
    MergingPaths {
        old: SmallVec<[EdgeId; 4]>,
        new: EdgeId,
    },
    /// `old` was cut `pos` k-mers from its start into `new.0` and `new.1`.
    SplittingEdge {
        old: EdgeId,
        pos: usize,
        new: (EdgeId, EdgeId),
    },
    /// `e1` is glued onto `e2`; `keep` survives.
    GluingEdges {
        e1: EdgeId,
        e2: EdgeId,
        keep: EdgeId,
    },
}

impl GraphEvent {
    pub fn kind(&self) -> EventMask {
        match self {
            GraphEvent::AddingVertex(_) => EventMask::ADDING_VERTEX,
            GraphEvent::DeletingVertex(_) => EventMask::DELETING_VERTEX,
            GraphEvent::AddingEdge(_) => EventMask::ADDING_EDGE,
            GraphEvent::DeletingEdge(_) => EventMask::DELETING_EDGE,
            GraphEvent::MergingPaths { .. } => EventMask::MERGING_PATHS,
            GraphEvent::SplittingEdge { .. } => EventMask::SPLITTING_EDGE,
            GraphEvent::GluingEdges { .. } => EventMask::GLUING_EDGES,
        }
    }
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphEvent::AddingVertex(v) => write!(f, "AddingVertex({v})"),
            GraphEvent::DeletingVertex(v) => write!(f, "DeletingVertex({v})"),
            GraphEvent::AddingEdge(e) => write!(f, "AddingEdge({e})"),
            GraphEvent::DeletingEdge(e) => write!(f, "DeletingEdge({e})"),
            GraphEvent::MergingPaths { old, new } => write!(f, "MergingPaths({old:?} -> {new})"),
            GraphEvent::SplittingEdge { old, pos, new } => {
                write!(f, "SplittingEdge({old} @{pos} -> {}, {})", new.0, new.1)
            }
            GraphEvent::GluingEdges { e1, e2, keep } => {
                write!(f, "GluingEdges({e1}, {e2}, keep {keep})")
            }
        }
    }
}

/// The set of event kinds a handler implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const ADDING_VERTEX: EventMask = EventMask(1);
    pub const DELETING_VERTEX: EventMask = EventMask(1 << 1);
    pub const ADDING_EDGE: EventMask = EventMask(1 << 2);
    pub const DELETING_EDGE: EventMask = EventMask(1 << 3);
    pub const MERGING_PATHS: EventMask = EventMask(1 << 4);
    pub const SPLITTING_EDGE: EventMask = EventMask(1 << 5);
    pub const GLUING_EDGES: EventMask = EventMask(1 << 6);
    pub const ALL: EventMask = EventMask(0x7f);

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// An observer. `handle` is only called for the kinds in `events()`, and must not mutate the
/// graph; work that needs a mutation is queued and run once the mutation has returned.
pub trait GraphHandler: Send + Sync {
    fn name(&self) -> &str;

    fn events(&self) -> EventMask {
        EventMask::ALL
    }

    fn handle(&self, graph: &Graph, event: &GraphEvent) -> std::result::Result<(), HandlerFault>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registered {
    id: HandlerId,
    handler: Arc<dyn GraphHandler>,
}

thread_local! {
    static DELIVERING: Cell<bool> = Cell::new(false);
}

/// True on a thread that is inside a handler.
pub(crate) fn delivering() -> bool {
    DELIVERING.with(Cell::get)
}

pub struct HandlerRegistry {
    handlers: RwLock<Vec<Registered>>,
    next_id: AtomicU64,
    tickets: AtomicU64,
    turn: Mutex<u64>,
    turn_changed: Condvar,
}

/// A place in the delivery order, drawn when a mutation takes effect. It must be delivered
/// (or dropped) or all later mutations wait forever.
pub(crate) struct Ticket<'r> {
    registry: &'r HandlerRegistry,
    number: u64,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            tickets: AtomicU64::new(0),
            turn: Mutex::new(0),
            turn_changed: Condvar::new(),
        }
    }
}

impl HandlerRegistry {
    pub fn register(&self, handler: Arc<dyn GraphHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(handler = handler.name(), ?id, "registering handler");
        self.handlers.write().push(Registered { id, handler });
        id
    }
    pub fn unregister(&self, id: HandlerId) -> Option<Arc<dyn GraphHandler>> {
        let mut handlers = self.handlers.write();
        let i = handlers.iter().position(|r| r.id == id)?;
        Some(handlers.remove(i).handler)
    }
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|r| r.handler.name().to_string())
            .collect()
    }

    pub(crate) fn ticket(&self) -> Ticket<'_> {
        Ticket {
            registry: self,
            number: self.tickets.fetch_add(1, Ordering::AcqRel),
        }
    }

    fn wait_turn(&self, number: u64) {
        let mut turn = self.turn.lock();
        while *turn != number {
            self.turn_changed.wait(&mut turn);
        }
    }
    fn advance_turn(&self) {
        *self.turn.lock() += 1;
        self.turn_changed.notify_all();
    }

    /// Hand `events` to every interested handler once all earlier tickets are through. Stops
    /// at the first fault.
    pub(crate) fn deliver(
        &self,
        graph: &Graph,
        ticket: Ticket<'_>,
        events: &[GraphEvent],
    ) -> Result<()> {
        ticket.wait();
        let handlers: Vec<Arc<dyn GraphHandler>> = self
            .handlers
            .read()
            .iter()
            .map(|r| r.handler.clone())
            .collect();
        let _delivering = DeliveryGuard::enter();
        for event in events {
            let kind = event.kind();
            for handler in handlers.iter().filter(|h| h.events().contains(kind)) {
                handler
                    .handle(graph, event)
                    .map_err(|fault| GraphError::HandlerFault {
                        handler: handler.name().to_string(),
                        fault,
                    })?;
            }
        }
        Ok(())
    }
}

impl Ticket<'_> {
    fn wait(&self) {
        self.registry.wait_turn(self.number);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        // reached on every path out of `deliver`, including unwinding out of a handler
        self.registry.wait_turn(self.number);
        self.registry.advance_turn();
    }
}

struct DeliveryGuard;

impl DeliveryGuard {
    fn enter() -> Self {
        DELIVERING.with(|d| d.set(true));
        DeliveryGuard
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.set(false));
    }
}
