//! Acquisition and release of the heavy model handles.
//!
//! A `ResourceLifecycleManager` owns the models of one stage on one device.
//! In `Resident` mode they are loaded once and kept until `shutdown`; in
//! `OnDemand` mode every `acquire` loads them fresh and dropping the lease
//! releases them and asks the provider to reclaim device memory.
//!
//! The slot mutex is the device's mutual-exclusion boundary: at most one
//! lease exists per manager at any time, in either mode.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::error::{PipelineError, Result};
use crate::models::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new("cuda:0")
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidencyMode {
    /// Load at startup, keep for the process lifetime
    Resident,
    /// Load per request, release when the request ends
    OnDemand,
}

impl FromStr for ResidencyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resident" => Ok(Self::Resident),
            "on_demand" | "on-demand" | "ondemand" => Ok(Self::OnDemand),
            other => Err(format!("unknown residency mode '{other}', expected resident or on_demand")),
        }
    }
}

impl fmt::Display for ResidencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resident => f.write_str("resident"),
            Self::OnDemand => f.write_str("on_demand"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
}

/// Knows how to bring a stage's models up on a device and how to give the
/// memory back afterwards.
pub trait ModelProvider: Send + Sync {
    type Models: Send;

    fn name(&self) -> &str;

    fn load(&self, device: &DeviceId) -> std::result::Result<Self::Models, ModelError>;

    /// Force the device to return memory freed by dropped models
    fn reclaim(&self, _device: &DeviceId) -> std::result::Result<(), ModelError> {
        Ok(())
    }
}

/// Type-erased provider, so services need not be generic over the backend
pub type DynProvider<M> = Box<dyn ModelProvider<Models = M>>;

impl<M: Send> ModelProvider for DynProvider<M> {
    type Models = M;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(&self, device: &DeviceId) -> std::result::Result<M, ModelError> {
        (**self).load(device)
    }

    fn reclaim(&self, device: &DeviceId) -> std::result::Result<(), ModelError> {
        (**self).reclaim(device)
    }
}

pub struct ResourceLifecycleManager<P: ModelProvider> {
    provider: P,
    mode: ResidencyMode,
    device: DeviceId,
    slot: Mutex<Option<P::Models>>,
    state: Mutex<LoadState>,
}

impl<P: ModelProvider> ResourceLifecycleManager<P> {
    /// Create the manager. Resident mode loads the models right away and fails
    /// fast when they cannot be loaded.
    pub fn start(provider: P, mode: ResidencyMode, device: DeviceId) -> Result<Self> {
        let manager = Self {
            provider,
            mode,
            device,
            slot: Mutex::new(None),
            state: Mutex::new(LoadState::Unloaded),
        };

        info!(model = manager.provider.name(), mode = %manager.mode, device = %manager.device, "Starting model lifecycle manager");

        if mode == ResidencyMode::Resident {
            let models = manager.load()?;
            *manager.lock_slot() = Some(models);
        }

        Ok(manager)
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn state(&self) -> LoadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the device, then hand out the stage's models.
    ///
    /// Load failures are returned as `ModelUnavailable` and never retried here.
    pub fn acquire(&self) -> Result<ModelLease<'_, P>> {
        let mut slot = self.lock_slot();

        if slot.is_none() {
            *slot = Some(self.load()?);
        }

        Ok(ModelLease { manager: self, slot })
    }

    /// Release resident models at process exit
    pub fn shutdown(&self) {
        let mut slot = self.lock_slot();
        if let Some(models) = slot.take() {
            self.unload(models);
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<P::Models>> {
        // A panic during inference poisons the slot; the models are still owned by it.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LoadState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn load(&self) -> Result<P::Models> {
        self.set_state(LoadState::Loading);
        let started = Instant::now();

        match self.provider.load(&self.device) {
            Ok(models) => {
                self.set_state(LoadState::Ready);
                info!(
                    model = self.provider.name(),
                    device = %self.device,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Models loaded"
                );
                Ok(models)
            }
            Err(source) => {
                self.set_state(LoadState::Unloaded);
                Err(PipelineError::ModelUnavailable {
                    model: self.provider.name().to_string(),
                    device: self.device.to_string(),
                    source,
                })
            }
        }
    }

    fn unload(&self, models: P::Models) {
        drop(models);
        if let Err(e) = self.provider.reclaim(&self.device) {
            warn!(model = self.provider.name(), device = %self.device, error = %e, "Device memory reclaim failed");
        }
        self.set_state(LoadState::Unloaded);
        info!(model = self.provider.name(), device = %self.device, "Models released");
    }
}

/// Exclusive use of a stage's models for the duration of one request
pub struct ModelLease<'a, P: ModelProvider> {
    manager: &'a ResourceLifecycleManager<P>,
    slot: MutexGuard<'a, Option<P::Models>>,
}

impl<P: ModelProvider> ModelLease<'_, P> {
    /// End the request's use of the models
    pub fn release(self) {}
}

impl<P: ModelProvider> Deref for ModelLease<'_, P> {
    type Target = P::Models;

    fn deref(&self) -> &P::Models {
        match self.slot.as_ref() {
            Some(models) => models,
            None => unreachable!("a lease is only created over a loaded slot"),
        }
    }
}

impl<P: ModelProvider> Drop for ModelLease<'_, P> {
    fn drop(&mut self) {
        if self.manager.mode == ResidencyMode::OnDemand {
            if let Some(models) = self.slot.take() {
                self.manager.unload(models);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use crate::testing::{FakeDevice, FakeProvider};
    use super::*;

    #[test]
    fn test_resident_loads_once_at_start() {
        let device = FakeDevice::default();
        let provider = FakeProvider::new(device.clone(), 4096);

        let manager = ResourceLifecycleManager::start(provider, ResidencyMode::Resident, DeviceId::default()).unwrap();
        assert_eq!(manager.state(), LoadState::Ready);
        assert_eq!(device.allocated(), 4096);

        for _ in 0..3 {
            let lease = manager.acquire().unwrap();
            assert_eq!(lease.footprint(), 4096);
        }

        assert_eq!(manager.provider().loads(), 1);
        assert_eq!(device.allocated(), 4096);
    }

    #[test]
    fn test_on_demand_returns_memory_to_baseline() {
        let device = FakeDevice::default();
        let baseline = device.allocated();
        let provider = FakeProvider::new(device.clone(), 8192);

        let manager = ResourceLifecycleManager::start(provider, ResidencyMode::OnDemand, DeviceId::default()).unwrap();
        assert_eq!(manager.state(), LoadState::Unloaded);

        for _ in 0..2 {
            let lease = manager.acquire().unwrap();
            assert_eq!(device.allocated(), baseline + 8192);
            lease.release();
            assert_eq!(device.allocated(), baseline);
        }

        assert_eq!(manager.provider().loads(), 2);
        assert_eq!(manager.provider().reclaims(), 2);
        assert_eq!(manager.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_load_failure_is_model_unavailable_without_retry() {
        let provider = FakeProvider::failing(FakeDevice::default(), "checkpoint missing");

        let manager = ResourceLifecycleManager::start(provider, ResidencyMode::OnDemand, DeviceId::new("cuda:1")).unwrap();
        let err = manager.acquire().err().unwrap();

        assert!(matches!(err, PipelineError::ModelUnavailable { ref device, .. } if device == "cuda:1"));
        assert_eq!(manager.provider().loads(), 1);
        assert_eq!(manager.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_resident_start_fails_fast() {
        let provider = FakeProvider::failing(FakeDevice::default(), "device unavailable");

        let result = ResourceLifecycleManager::start(provider, ResidencyMode::Resident, DeviceId::default());
        assert!(matches!(result, Err(PipelineError::ModelUnavailable { .. })));
    }

    #[test]
    fn test_shutdown_releases_resident_models() {
        let device = FakeDevice::default();
        let provider = FakeProvider::new(device.clone(), 1024);

        let manager = ResourceLifecycleManager::start(provider, ResidencyMode::Resident, DeviceId::default()).unwrap();
        manager.shutdown();

        assert_eq!(device.allocated(), 0);
        assert_eq!(manager.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_leases_are_mutually_exclusive() {
        let provider = FakeProvider::new(FakeDevice::default(), 1);
        let manager = ResourceLifecycleManager::start(provider, ResidencyMode::OnDemand, DeviceId::default()).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let _lease = manager.acquire().unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(manager.provider().loads(), 4);
    }

    #[test]
    fn test_residency_mode_parsing() {
        assert_eq!("resident".parse::<ResidencyMode>().unwrap(), ResidencyMode::Resident);
        assert_eq!("on-demand".parse::<ResidencyMode>().unwrap(), ResidencyMode::OnDemand);
        assert_eq!("ON_DEMAND".parse::<ResidencyMode>().unwrap(), ResidencyMode::OnDemand);
        assert!("lazy".parse::<ResidencyMode>().is_err());
    }
}
