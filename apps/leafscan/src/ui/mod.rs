//! Terminal presentation: text rendering and explanation export.

pub mod export;
pub mod render;
