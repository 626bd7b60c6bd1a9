// Roel Kluin, 2023, GPL v3

//records, construction stats
#[macro_use]
extern crate derive_new;

#[macro_use]
pub mod rdbg;
#[macro_use]
pub mod error;

pub mod ids;
pub mod id_distributor;
pub mod sequence;
pub mod table;
pub mod conjugate;
pub mod vertex_store;
pub mod edge_store;
pub mod config;
pub mod graph;
mod mutator;
pub mod handlers;
pub mod simplification;
pub mod construction;
pub mod persistence;
pub mod cmd;

pub use config::{AssemblyConfig, GraphConfig, SimplificationConfig};
pub use error::{GraphError, HandlerFault, Result};
pub use graph::Graph;
pub use handlers::{GraphEvent, GraphHandler, HandlerRegistry};
pub use ids::{EdgeId, EntityId, VertexId};
pub use sequence::Sequence;
