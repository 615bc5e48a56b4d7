//! Wire types shared between the plant identification client and its front-ends.

pub mod domain;
pub mod error;
pub mod protocol;
