//! Ports - Trait definitions for the external collaborators.

pub mod fetcher;
pub mod storage;
pub mod transcoder;
