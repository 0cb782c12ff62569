pub mod executor;
pub mod graph;

pub use executor::{Migrator, Target};
