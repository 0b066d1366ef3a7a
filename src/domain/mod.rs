// Domain layer - Core types and dependency rules

pub mod errors;
pub mod model;
pub mod rules;
