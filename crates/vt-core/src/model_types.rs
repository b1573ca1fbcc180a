use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::PipelineError;

/// Garment region the inpainting model is asked to regenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentCategory {
    Upper,
    Lower,
    Overall,
}

impl GarmentCategory {
    /// Wire identifier shared with the segmentation worker
    pub fn id(&self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Overall => "overall",
        }
    }

    pub fn all() -> [GarmentCategory; 3] {
        [Self::Upper, Self::Lower, Self::Overall]
    }
}

impl Default for GarmentCategory {
    fn default() -> Self {
        Self::Upper
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for GarmentCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|c| c.id() == s.trim())
            .ok_or_else(|| PipelineError::InvalidCategory(s.to_string()))
    }
}

/// Output representation requested from the reconstruction stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionModality {
    Gaussian,
    RadianceField,
    Mesh,
    Glb,
}

impl ReconstructionModality {
    /// Wire identifier used by the reconstruction operation
    pub fn id(&self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::RadianceField => "radiance_field",
            Self::Mesh => "mesh",
            Self::Glb => "glb",
        }
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            Self::Gaussian | Self::RadianceField | Self::Mesh => ArtifactKind::Video,
            Self::Glb => ArtifactKind::Scene,
        }
    }

    pub fn all() -> [ReconstructionModality; 4] {
        [Self::Gaussian, Self::RadianceField, Self::Mesh, Self::Glb]
    }
}

impl fmt::Display for ReconstructionModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ReconstructionModality {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| PipelineError::InvalidModality(s.to_string()))
    }
}

/// Internal representation held by a reconstructed scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneRepresentation {
    Gaussian,
    RadianceField,
    Mesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderChannel {
    Color,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Video,
    Scene,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Video => "mp4",
            Self::Scene => "glb",
        }
    }
}
