mod routes;
pub mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vt_core::lifecycle::DynProvider;
use vt_core::models::{ReconstructionModel, SwapModels, VideoEncoder};
use vt_core::pipeline::{GarmentSwapExecutor, ReconstructionLifecycle, ReconstructionRouter, SwapLifecycle};
use vt_models::{FfmpegEncoder, RemoteReconstructionProvider, RemoteSwapProvider};
use crate::backend::routes::{reconstruct_routes, swap_routes};
use crate::config::ServiceConfig;

pub use state::{ReconstructState, SwapState};

pub fn swap_app(state: Arc<SwapState>) -> Router {
    Router::new()
        .merge(swap_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn reconstruct_app(state: Arc<ReconstructState>) -> Router {
    Router::new()
        .merge(reconstruct_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the garment swap service until interrupted
pub async fn serve_swap(config: ServiceConfig) -> anyhow::Result<()> {
    let provider: DynProvider<SwapModels> = Box::new(RemoteSwapProvider::new(
        &config.inpaint_worker_url,
        &config.segment_worker_url,
    ));
    let (mode, device) = (config.swap_residency, config.device.clone());

    // Claim the port before paying for a model load
    let listener = bind(config.swap_addr(), "garment-swap").await?;

    // Worker clients block, so models are only ever loaded and dropped off the runtime
    let models = tokio::task::spawn_blocking(move || SwapLifecycle::start(provider, mode, device)).await??;
    let models = Arc::new(models);

    let executor = GarmentSwapExecutor::new(models.clone(), config.layout.swap_store());
    let app = swap_app(Arc::new(SwapState::new(executor)));

    let served = serve(listener, app, "garment-swap").await;

    tokio::task::spawn_blocking(move || models.shutdown()).await?;
    served
}

/// Run the 3D reconstruction service until interrupted
pub async fn serve_reconstruct(config: ServiceConfig) -> anyhow::Result<()> {
    let provider: DynProvider<Box<dyn ReconstructionModel>> =
        Box::new(RemoteReconstructionProvider::new(&config.recon_worker_url));
    let (mode, device) = (config.recon_residency, config.device.clone());

    let listener = bind(config.recon_addr(), "reconstruction").await?;

    let model = tokio::task::spawn_blocking(move || ReconstructionLifecycle::start(provider, mode, device)).await??;
    let model = Arc::new(model);

    let encoder: Arc<dyn VideoEncoder> = Arc::new(FfmpegEncoder::with_path(&config.ffmpeg));
    let router = ReconstructionRouter::new(model.clone(), encoder, config.layout.clone());
    let app = reconstruct_app(Arc::new(ReconstructState::new(router)));

    let served = serve(listener, app, "reconstruction").await;

    tokio::task::spawn_blocking(move || model.shutdown()).await?;
    served
}

async fn bind(addr: SocketAddr, service: &str) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {service} service to {addr}"))
}

async fn serve(listener: TcpListener, app: Router, service: &str) -> anyhow::Result<()> {
    info!(addr = ?listener.local_addr().ok(), service, "Starting backend server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(service, "Backend server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use image::RgbImage;
    use serde_json::Value;
    use tower::ServiceExt;
    use vt_core::artifact::StorageLayout;
    use vt_core::lifecycle::{DeviceId, ResidencyMode, ResourceLifecycleManager};
    use vt_core::testing::{solid_png, FakeDevice, FakeEncoder, FakeReconstructionProvider, FakeSwapProvider};
    use super::*;

    const BOUNDARY: &str = "vt-test-boundary";

    fn multipart(fields: &[(&str, Vec<u8>)]) -> Body {
        let mut body = Vec::new();
        for (name, data) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn swap_request(fields: &[(&str, Vec<u8>)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/swap")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(multipart(fields))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn swap_service(provider: FakeSwapProvider, mode: ResidencyMode, layout: &StorageLayout) -> Router {
        let provider: DynProvider<SwapModels> = Box::new(provider);
        let models = ResourceLifecycleManager::start(provider, mode, DeviceId::default()).unwrap();
        let executor = GarmentSwapExecutor::new(Arc::new(models), layout.swap_store());
        swap_app(Arc::new(SwapState::new(executor)))
    }

    fn reconstruct_service(layout: &StorageLayout) -> Router {
        let provider: DynProvider<Box<dyn ReconstructionModel>> =
            Box::new(FakeReconstructionProvider::new(FakeDevice::default()));
        let model = ResourceLifecycleManager::start(provider, ResidencyMode::Resident, DeviceId::default()).unwrap();
        let router = ReconstructionRouter::new(Arc::new(model), Arc::new(FakeEncoder::default()), layout.clone());
        reconstruct_app(Arc::new(ReconstructState::new(router)))
    }

    #[tokio::test]
    async fn test_swap_returns_portable_reference() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let app = swap_service(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::Resident, &layout);

        let response = app
            .oneshot(swap_request(&[
                ("person_image", solid_png(600, 800)),
                ("cloth_image", solid_png(300, 400)),
                ("cloth_type", b"upper".to_vec()),
                ("mask", Vec::new()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let output = body["output_path"].as_str().unwrap();
        assert!(output.starts_with("3d_targets/result_"), "{output}");
        assert!(root.path().join(output).is_file());
    }

    #[tokio::test]
    async fn test_swap_rejects_unknown_category() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let app = swap_service(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::Resident, &layout);

        let response = app
            .oneshot(swap_request(&[
                ("person_image", solid_png(64, 64)),
                ("cloth_image", solid_png(64, 64)),
                ("cloth_type", b"shoes".to_vec()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_category_error");
    }

    #[tokio::test]
    async fn test_swap_requires_person_image() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let app = swap_service(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::Resident, &layout);

        let response = app
            .oneshot(swap_request(&[("cloth_image", solid_png(64, 64)), ("cloth_type", b"lower".to_vec())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "bad_request_error");
        assert!(body["detail"].as_str().unwrap().contains("person_image"));
    }

    #[tokio::test]
    async fn test_unloadable_models_are_service_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let app = swap_service(
            FakeSwapProvider::failing_load(FakeDevice::default(), "CUDA out of memory"),
            ResidencyMode::OnDemand,
            &layout,
        );

        let response = app
            .oneshot(swap_request(&[
                ("person_image", solid_png(64, 64)),
                ("cloth_image", solid_png(64, 64)),
                ("cloth_type", b"overall".to_vec()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"], "model_unavailable_error");
    }

    #[tokio::test]
    async fn test_process_image_glb() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let source = layout
            .swap_store()
            .persist_image("result", &RgbImage::new(32, 32))
            .unwrap();
        let app = reconstruct_service(&layout);

        let response = app
            .oneshot(json_request(
                "/process-image",
                serde_json::json!({ "image_path": source.reference.as_str(), "return_type": "glb" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "scene");
        assert!(body["output_path"].as_str().unwrap().starts_with("3d_outputs/output_"));
    }

    #[tokio::test]
    async fn test_process_image_error_statuses() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let source = layout
            .swap_store()
            .persist_image("result", &RgbImage::new(32, 32))
            .unwrap();

        let response = reconstruct_service(&layout)
            .oneshot(json_request(
                "/process-image",
                serde_json::json!({ "image_path": source.reference.as_str(), "return_type": "video" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_modality_error");

        let response = reconstruct_service(&layout)
            .oneshot(json_request(
                "/process-image",
                serde_json::json!({ "image_path": "3d_targets/nope.png", "return_type": "mesh" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = reconstruct_service(&layout)
            .oneshot(json_request("/process-image", serde_json::json!({ "image_path": "x.png" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());

        let resident = swap_service(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::Resident, &layout);
        let response = resident
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models"], "ready");

        let on_demand = swap_service(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::OnDemand, &layout);
        let response = on_demand
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["models"], "unloaded");
    }

    #[tokio::test]
    async fn test_busy_port_fails_before_models_load() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port().to_string();
        let config = ServiceConfig::from_lookup(|key| match key {
            "VT_HOST" => Some("127.0.0.1".to_string()),
            "VT_SWAP_PORT" => Some(port.clone()),
            "VT_INPAINT_WORKER_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();

        let err = serve_swap(config).await.unwrap_err();

        // A load attempt would have failed on the unreachable worker instead
        assert!(err.to_string().starts_with("Failed to bind garment-swap service"), "{err:#}");
    }
}
