//! Pipeline - stage catalog and severity classification

mod definition;
mod severity;

pub use definition::{PipelineDefinition, StageSpec};
pub use severity::SeverityClassifier;
