//! HTTP 错误响应

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use netdiag_toolbox::ToolboxError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Toolbox(#[from] ToolboxError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    code: &'a str,
}

impl ApiError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Toolbox(e) => e.code(),
            Self::Timeout(_) => "Timeout",
            Self::BadRequest(_) => "InvalidArgument",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Toolbox(e) => match e {
                ToolboxError::InvalidArgument(_) | ToolboxError::ResolutionError(_) => {
                    StatusCode::BAD_REQUEST
                }
                ToolboxError::NoEndpointsAvailable => StatusCode::SERVICE_UNAVAILABLE,
                ToolboxError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
                ToolboxError::PermissionError(_)
                | ToolboxError::NetworkError(_)
                | ToolboxError::TransferError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            code: self.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ToolboxError::InvalidArgument("x".into()), 400),
            (ToolboxError::ResolutionError("x".into()), 400),
            (ToolboxError::PermissionError("x".into()), 500),
            (ToolboxError::NetworkError("x".into()), 500),
            (ToolboxError::NoEndpointsAvailable, 503),
            (ToolboxError::UpstreamError("x".into()), 502),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code().as_u16(), status);
        }
        assert_eq!(ApiError::Timeout("WHOIS").status_code().as_u16(), 504);
    }

    #[test]
    fn test_code_follows_toolbox_variant() {
        assert_eq!(
            ApiError::from(ToolboxError::NoEndpointsAvailable).code(),
            "NoEndpointsAvailable"
        );
        assert_eq!(ApiError::BadRequest("missing".into()).code(), "InvalidArgument");
    }
}
