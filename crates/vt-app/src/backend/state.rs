use vt_core::pipeline::{GarmentSwapExecutor, ReconstructionRouter};

pub struct SwapState {
    pub executor: GarmentSwapExecutor,
}

impl SwapState {
    pub fn new(executor: GarmentSwapExecutor) -> Self {
        Self { executor }
    }
}

pub struct ReconstructState {
    pub router: ReconstructionRouter,
}

impl ReconstructState {
    pub fn new(router: ReconstructionRouter) -> Self {
        Self { router }
    }
}
