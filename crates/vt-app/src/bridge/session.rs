use vt_core::artifact::ArtifactRef;

/// What one front-end user has produced so far.
///
/// A new swap result supersedes the previous 3D output, since that output
/// was built from the older image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    last_swap: Option<ArtifactRef>,
    last_reconstruction: Option<ArtifactRef>,
}

impl Session {
    pub fn last_swap(&self) -> Option<&ArtifactRef> {
        self.last_swap.as_ref()
    }

    pub fn last_reconstruction(&self) -> Option<&ArtifactRef> {
        self.last_reconstruction.as_ref()
    }

    pub fn record_swap(&mut self, reference: ArtifactRef) {
        self.last_swap = Some(reference);
        self.last_reconstruction = None;
    }

    pub fn record_reconstruction(&mut self, reference: ArtifactRef) {
        self.last_reconstruction = Some(reference);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_swap_clears_stale_reconstruction() {
        let mut session = Session::default();
        session.record_swap(ArtifactRef::new("3d_targets", "result_1.png"));
        session.record_reconstruction(ArtifactRef::new("3d_outputs", "glb_1.glb"));

        session.record_swap(ArtifactRef::new("3d_targets", "result_2.png"));

        assert_eq!(session.last_swap().unwrap().as_str(), "3d_targets/result_2.png");
        assert!(session.last_reconstruction().is_none());
    }

    #[test]
    fn test_reset() {
        let mut session = Session::default();
        session.record_swap(ArtifactRef::new("3d_targets", "result_1.png"));
        session.reset();
        assert_eq!(session, Session::default());
    }
}
