//! CLI command implementations.

pub mod history;
pub mod inspect;
pub mod load;
