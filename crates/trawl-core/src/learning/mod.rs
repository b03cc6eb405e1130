//! Learning tasks run against discovered models.

pub mod extraction;
pub mod inference;
pub mod interface;
pub mod knowledge;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use inference::InferenceClient;
pub use interface::{build_interface, ModelHandle, ModelInterface};
pub use knowledge::KnowledgeStore;
pub use scheduler::{AssetLookup, TaskScheduler};
pub use types::{KnowledgeContent, KnowledgeItem, LearningMethod, LearningStats, LearningTask, TaskStatus};
