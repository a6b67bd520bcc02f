//! The rule evaluator: a pure, deterministic classification of a customer
//! profile into persona identifiers, driven entirely by a configuration
//! snapshot.

mod evaluator;
mod rules;
mod types;

pub use evaluator::evaluate;
pub use types::{AssignmentMethod, ConfigSnapshot, ProfileInput};
