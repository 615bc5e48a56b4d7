//! Controller layer: UI events, command orchestration and the dispatch loop.

pub mod events;
pub mod orchestration;
pub mod session;
