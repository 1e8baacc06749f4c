use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use orrange_db::{NftTransferError, PurchaseError, SubscribeError};
use orrange_types::api::ErrorBody;

/// Every handler failure. Rendered as `{"message": ...}` with the matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal() -> Self {
        Self::Internal("Internal server error".into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { message: self.to_string() })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Database error: {:#}", e);
        Self::internal()
    }
}

/// Purchase failures surface as 500 with the reason as the message.
impl From<PurchaseError> for ApiError {
    fn from(e: PurchaseError) -> Self {
        match e {
            PurchaseError::Sqlite(_) | PurchaseError::Other(_) => {
                error!("Purchase failed: {}", e);
                Self::internal()
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<NftTransferError> for ApiError {
    fn from(e: NftTransferError) -> Self {
        match e {
            NftTransferError::NotFound | NftTransferError::RecipientNotFound => Self::NotFound(e.to_string()),
            NftTransferError::NotOwner => Self::Forbidden(e.to_string()),
            NftTransferError::SelfTransfer => Self::BadRequest(e.to_string()),
            NftTransferError::Sqlite(_) | NftTransferError::Other(_) => {
                error!("NFT transfer failed: {}", e);
                Self::internal()
            }
        }
    }
}

impl From<SubscribeError> for ApiError {
    fn from(e: SubscribeError) -> Self {
        match e {
            SubscribeError::SelfSubscription | SubscribeError::InsufficientFunds { .. } => {
                Self::BadRequest(e.to_string())
            }
            SubscribeError::CreatorNotFound | SubscribeError::SubscriberNotFound => Self::NotFound(e.to_string()),
            SubscribeError::AlreadySubscribed => Self::Conflict(e.to_string()),
            SubscribeError::Sqlite(_) | SubscribeError::Other(_) => {
                error!("Subscription failed: {}", e);
                Self::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_reasons_are_500_with_message() {
        let err: ApiError = PurchaseError::AlreadySold.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Listing has already been sold");

        let err: ApiError = PurchaseError::InsufficientFunds { balance: 5, price: 10 }.into();
        assert_eq!(err.to_string(), "Insufficient coins: balance 5, price 10");
    }

    #[test]
    fn storage_errors_hide_details() {
        let err: ApiError = anyhow::anyhow!("disk I/O error").into();
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn transfer_errors_map_to_statuses() {
        assert_eq!(ApiError::from(NftTransferError::NotOwner).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(NftTransferError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(SubscribeError::AlreadySubscribed).status(), StatusCode::CONFLICT);
    }
}
