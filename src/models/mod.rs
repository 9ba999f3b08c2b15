//! Domain model module declarations.

pub mod outbound;
pub mod record;
pub mod stage;
