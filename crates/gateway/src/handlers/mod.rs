//! API handlers module

pub mod ask;
pub mod graph;
pub mod health;
pub mod interactions;
pub mod providers;
