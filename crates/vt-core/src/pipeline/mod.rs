mod reconstruct;
mod swap;

pub use reconstruct::{ReconstructionLifecycle, ReconstructionRequest, ReconstructionRouter};
pub use swap::{GarmentSwapExecutor, GenerationRequest, SwapLifecycle};
