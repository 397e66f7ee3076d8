//! Domain layer - Pure business logic.

pub mod allow_list;
pub mod events;
pub mod jobs;
pub mod media;
