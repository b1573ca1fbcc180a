pub mod artifact;
pub mod asset;
pub mod error;
pub mod lifecycle;
pub mod mask;
mod model_types;
pub mod models;
pub mod pipeline;
pub mod preprocess;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{PipelineError, Result};
pub use model_types::{ArtifactKind, GarmentCategory, ReconstructionModality, RenderChannel, SceneRepresentation};
