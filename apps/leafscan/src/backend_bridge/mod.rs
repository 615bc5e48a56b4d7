//! Background worker that executes remote calls for the dispatch thread.

pub mod commands;
pub mod runtime;
