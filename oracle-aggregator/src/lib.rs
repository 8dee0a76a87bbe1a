pub mod aggregator;
pub mod batch_builder;

pub use aggregator::{confidence_for, Aggregator};
pub use batch_builder::BatchBuilder;
