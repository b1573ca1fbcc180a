use std::env;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use anyhow::anyhow;
use vt_core::artifact::StorageLayout;
use vt_core::lifecycle::{DeviceId, ResidencyMode};

/// Settings shared by the swap and reconstruction services
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub swap_port: u16,
    pub recon_port: u16,
    pub layout: StorageLayout,
    pub swap_residency: ResidencyMode,
    pub recon_residency: ResidencyMode,
    pub device: DeviceId,
    pub inpaint_worker_url: String,
    pub segment_worker_url: String,
    pub recon_worker_url: String,
    pub ffmpeg: String,
}

impl ServiceConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let inpaint_worker_url = lookup("VT_INPAINT_WORKER_URL").unwrap_or_else(|| "http://127.0.0.1:9201".to_string());
        // Both swap models are usually served by one worker
        let segment_worker_url = lookup("VT_SEGMENT_WORKER_URL").unwrap_or_else(|| inpaint_worker_url.clone());

        Ok(Self {
            host: parse_or(&lookup, "VT_HOST", IpAddr::from([0, 0, 0, 0]))?,
            swap_port: parse_or(&lookup, "VT_SWAP_PORT", 9111)?,
            recon_port: parse_or(&lookup, "VT_RECON_PORT", 9112)?,
            layout: StorageLayout {
                image_root: lookup("VT_IMAGE_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("../imgs")),
                swap_dir: lookup("VT_SWAP_OUTPUT_DIR").unwrap_or_else(|| "3d_targets".to_string()),
                reconstruction_dir: lookup("VT_RECON_OUTPUT_DIR").unwrap_or_else(|| "3d_outputs".to_string()),
            },
            swap_residency: parse_or(&lookup, "VT_RESIDENCY", ResidencyMode::Resident)?,
            recon_residency: parse_or(&lookup, "VT_RECON_RESIDENCY", ResidencyMode::Resident)?,
            device: lookup("VT_DEVICE").map(DeviceId::new).unwrap_or_default(),
            inpaint_worker_url,
            segment_worker_url,
            recon_worker_url: lookup("VT_RECON_WORKER_URL").unwrap_or_else(|| "http://127.0.0.1:9202".to_string()),
            ffmpeg: lookup("VT_FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
        })
    }

    pub fn swap_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.swap_port)
    }

    pub fn recon_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.recon_port)
    }
}

/// Where the bridge finds the two services and the shared image root
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub swap_url: String,
    pub recon_url: String,
    pub image_root: PathBuf,
}

impl BridgeConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            swap_url: lookup("VT_SWAP_URL").unwrap_or_else(|| "http://localhost:9111".to_string()),
            recon_url: lookup("VT_RECON_URL").unwrap_or_else(|| "http://localhost:9112".to_string()),
            image_root: lookup("VT_IMAGE_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("../imgs")),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| anyhow!("{key} must be valid, got '{raw}': {e}")),
        None => Ok(default),
    }
}
