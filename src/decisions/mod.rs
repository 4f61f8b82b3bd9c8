//! Decision records: the type, and the repository that persists them.

pub mod model;
pub mod repository;

pub use model::{Decision, DecisionEdge, Outcome, RelationshipType, SaveInput, UpdateOutcomeInput};
pub use repository::RepositoryError;
