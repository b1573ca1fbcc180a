use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};
use vt_core::error::ErrorClass;
use vt_core::PipelineError;
use crate::backend::schemas::ErrorBody;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Pipeline(e) => match e.class() {
                ErrorClass::Client => StatusCode::BAD_REQUEST,
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Pipeline(e) => e.code(),
            Self::BadRequest(_) => "bad_request_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// `message: cause: cause ...`
pub fn cause_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = cause_chain(&self);

        if status.is_server_error() {
            error!(code = self.code(), status = status.as_u16(), error = %detail, "Request failed");
        } else {
            warn!(code = self.code(), status = status.as_u16(), error = %detail, "Request rejected");
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use vt_core::error::MaskResolutionError;
    use vt_core::models::ModelError;
    use super::*;

    #[test]
    fn test_status_follows_error_class() {
        let cases = [
            (PipelineError::InvalidModality("video".into()), StatusCode::BAD_REQUEST),
            (PipelineError::SourceNotFound(PathBuf::from("x.png")), StatusCode::NOT_FOUND),
            (
                PipelineError::ModelUnavailable {
                    model: "garment-swap".into(),
                    device: "cuda:0".into(),
                    source: ModelError::new("out of memory"),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PipelineError::GenerationFailed(ModelError::new("nan latents")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_detail_includes_cause() {
        let err = ApiError::from(PipelineError::ModelUnavailable {
            model: "reconstruction".into(),
            device: "cuda:0".into(),
            source: ModelError::new("checkpoint missing"),
        });
        let detail = cause_chain(&err);

        assert!(detail.contains("unavailable on cuda:0"), "{detail}");
        assert!(detail.ends_with("checkpoint missing"), "{detail}");
    }

    #[test]
    fn test_detail_names_each_cause_once() {
        let err = ApiError::from(PipelineError::GenerationFailed(ModelError::new("nan latents")));
        assert_eq!(cause_chain(&err), "Garment swap generation failed: nan latents");

        let err = ApiError::from(PipelineError::from(MaskResolutionError::Segmentation(ModelError::new(
            "densepose",
        ))));
        assert_eq!(cause_chain(&err), "Mask resolution failed: segmentation failed: densepose");
    }
}
