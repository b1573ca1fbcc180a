use std::time::Duration;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vt_core::lifecycle::DeviceId;
use vt_core::models::ModelError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking JSON client for one inference worker process.
///
/// Must be built and dropped outside of an async runtime. Inference calls
/// carry no overall timeout; only the connection attempt is bounded.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    base_url: String,
    http: Client,
}

#[derive(Serialize)]
struct DeviceBody<'a> {
    device: &'a str,
}

/// Names the model too, since one worker may host several
#[derive(Debug, Serialize)]
struct ModelBody<'a> {
    model: &'a str,
    device: &'a str,
}

/// Body returned by endpoints with nothing to report
#[derive(Deserialize)]
pub struct Ack {}

impl WorkerClient {
    pub fn connect(base_url: &str) -> Result<Self, ModelError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ModelError::with_source("Failed to build worker client", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ModelError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%url, "Calling inference worker");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| ModelError::with_source(format!("Failed to reach worker at {url}"), e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ModelError::new(format!("Worker {url} returned HTTP {status}: {body}")));
        }

        response
            .json()
            .map_err(|e| ModelError::with_source(format!("Failed to parse response from {url}"), e))
    }

    pub fn load(&self, model: &str, device: &DeviceId) -> Result<(), ModelError> {
        self.post_json::<_, Ack>("load", &ModelBody { model, device: device.as_str() })?;
        Ok(())
    }

    pub fn unload(&self, model: &str, device: &DeviceId) -> Result<(), ModelError> {
        self.post_json::<_, Ack>("unload", &ModelBody { model, device: device.as_str() })?;
        Ok(())
    }

    /// Ask the worker to hand cached allocator blocks back to the device
    pub fn empty_cache(&self, device: &DeviceId) -> Result<(), ModelError> {
        self.post_json::<_, Ack>("empty_cache", &DeviceBody { device: device.as_str() })?;
        Ok(())
    }
}
