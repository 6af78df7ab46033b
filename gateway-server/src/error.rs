// gateway-server/src/error.rs
// ============================================================================
// Module: Handler Error Mapping
// Description: Converts store/delivery failures into HTTP responses.
// Purpose: Give every handler one `?`-compatible error type.
// Dependencies: axum, gateway-core, gateway-delivery, thiserror
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use gateway_core::interfaces::StoreError;
use thiserror::Error;

use gateway_contract::ErrorResponse;

/// Errors a handler can return; mapped to a JSON [`ErrorResponse`] body.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A delivery attempt failed at the infrastructure level.
    #[error("delivery error: {0}")]
    Delivery(#[from] gateway_delivery::DeliveryError),
    /// An inbound-proxy pipeline failure.
    #[error("inbound error: {0}")]
    Inbound(#[from] gateway_delivery::InboundError),
    /// An event-dispatch attempt failed at the infrastructure level.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] gateway_delivery::DispatchError),
    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request body or path/query parameters were invalid.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A DLQ state transition could not be applied.
    #[error("dlq state error: {0}")]
    DlqState(#[from] gateway_core::core::dlq::DlqError),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::DlqState(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Delivery(_) | Self::Inbound(_) | Self::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
