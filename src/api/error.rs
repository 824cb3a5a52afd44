//! The crate-wide HTTP error taxonomy (spec §7). Every handler returns
//! `Result<_, ApiError>`; this is the only place status codes are chosen.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::{AuthError, SessionError};
use crate::payment::PaymentError;
use crate::room::RoomError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Input
    #[error("missing_fields")]
    MissingFields,
    #[error("invalid_signature")]
    InvalidSignature,
    #[error("nonce_expired")]
    NonceExpired,
    #[error("nonce_unknown")]
    NonceUnknown,
    #[error("invalid_payment_signature")]
    InvalidPaymentSignature,

    // State
    #[error("room_not_initialized")]
    RoomNotInitialized,
    #[error("room_full")]
    RoomFull,
    #[error("room_not_live")]
    RoomNotLive,
    #[error("participant_not_found")]
    ParticipantNotFound,
    #[error("already_initialized")]
    AlreadyInitialized,
    #[error("already_live")]
    AlreadyLive,

    // Policy
    #[error("credits_exhausted")]
    CreditsExhausted,
    #[error("payment_required")]
    PaymentRequired { header: String },
    #[error("unauthorized")]
    Unauthorized,

    // External
    #[error("token_mint_failed")]
    TokenMintFailed,
    #[error("store_unavailable")]
    StoreUnavailable,
    #[error("vendor_unavailable")]
    VendorUnavailable,

    // Fatal
    #[error("internal_error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingFields => "missing_fields",
            ApiError::InvalidSignature => "invalid_signature",
            ApiError::NonceExpired => "nonce_expired",
            ApiError::NonceUnknown => "nonce_unknown",
            ApiError::InvalidPaymentSignature => "invalid_payment_signature",
            ApiError::RoomNotInitialized => "room_not_initialized",
            ApiError::RoomFull => "room_full",
            ApiError::RoomNotLive => "room_not_live",
            ApiError::ParticipantNotFound => "participant_not_found",
            ApiError::AlreadyInitialized => "already_initialized",
            ApiError::AlreadyLive => "already_live",
            ApiError::CreditsExhausted => "credits_exhausted",
            ApiError::PaymentRequired { .. } => "payment_required",
            ApiError::Unauthorized => "unauthorized",
            ApiError::TokenMintFailed => "token_mint_failed",
            ApiError::StoreUnavailable => "store_unavailable",
            ApiError::VendorUnavailable => "vendor_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::InvalidSignature | ApiError::NonceExpired | ApiError::NonceUnknown => StatusCode::UNAUTHORIZED,
            ApiError::InvalidPaymentSignature => StatusCode::PAYMENT_REQUIRED,
            ApiError::RoomNotInitialized | ApiError::ParticipantNotFound => StatusCode::NOT_FOUND,
            ApiError::RoomFull | ApiError::RoomNotLive | ApiError::AlreadyInitialized | ApiError::AlreadyLive => {
                StatusCode::CONFLICT
            }
            ApiError::CreditsExhausted => StatusCode::PAYMENT_REQUIRED,
            ApiError::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::TokenMintFailed | ApiError::VendorUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let header = if let ApiError::PaymentRequired { header } = &self {
            Some(header.clone())
        } else {
            None
        };
        let body = Json(json!({ "error": self.kind() }));

        let mut response = (status, body).into_response();
        if let Some(header) = header {
            if let Ok(value) = axum::http::HeaderValue::from_str(&header) {
                response.headers_mut().insert("PAYMENT-REQUIRED", value);
            }
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidSignature => ApiError::InvalidSignature,
            AuthError::NonceExpired => ApiError::NonceExpired,
            AuthError::NonceUnknown => ApiError::NonceUnknown,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(_: SessionError) -> Self {
        ApiError::Unauthorized
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature => ApiError::InvalidPaymentSignature,
            PaymentError::PaymentRequired => ApiError::CreditsExhausted,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(anyhow::Error::from(err))
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::RoomFull => ApiError::RoomFull,
            RoomError::RoomNotLive => ApiError::RoomNotLive,
            RoomError::AlreadyInitialized => ApiError::AlreadyInitialized,
            RoomError::ParticipantNotFound => ApiError::ParticipantNotFound,
            RoomError::Unauthorized => ApiError::Unauthorized,
            RoomError::PaymentRequired => ApiError::CreditsExhausted,
            RoomError::InvalidPaymentSignature => ApiError::InvalidPaymentSignature,
            RoomError::Internal(err) => ApiError::Internal(err),
        }
    }
}
