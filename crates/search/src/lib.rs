//! Search engine for LoopTune: the node model, the abstract strategy
//! contract, and the beam-search implementation.

pub mod beam;
pub mod config;
pub mod method;
pub mod node;

pub use beam::BeamSearch;
pub use config::SearchConfig;
pub use method::{SearchMethod, SearchResult, SearchStats};
pub use node::{Node, NodeArena, NodeId};
