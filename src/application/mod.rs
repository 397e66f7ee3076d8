//! Application layer - Services that drive jobs through the ports.

pub mod orchestrator;
pub mod pipeline;
pub mod pruner;
pub mod registry;
