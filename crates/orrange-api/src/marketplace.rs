use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use orrange_db::models::ListingRow;
use orrange_types::api::{Claims, CreateListingRequest, PurchaseResponse, WalletResponse};
use orrange_types::models::{LedgerKind, Listing};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::push;
use crate::posts::PageQuery;

pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Listing>>, ApiError> {
    let (limit, offset) = query.window();
    let rows = blocking(&state, move |db| db.list_listings(limit, offset)).await?;
    Ok(Json(rows.into_iter().map(ListingRow::into_listing).collect()))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Listing>, ApiError> {
    blocking(&state, move |db| db.get_listing(id))
        .await?
        .map(|row| Json(row.into_listing()))
        .ok_or_else(|| ApiError::not_found("Listing not found"))
}

pub async fn create_listing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Listing title is required"));
    }
    if req.price <= 0 {
        return Err(ApiError::bad_request("Price must be greater than zero"));
    }

    let me = claims.sub;
    let row = blocking(&state, move |db| {
        let id = db.create_listing(me, &title, req.description.as_deref(), req.price, req.image_url.as_deref())?;
        db.get_listing(id)
    })
    .await?
    .ok_or_else(ApiError::internal)?;

    Ok((StatusCode::CREATED, Json(row.into_listing())))
}

/// Buy a listing. Coins, the sold flag and the seller's notification commit
/// in one transaction; the ledger entry and the socket push follow it.
pub async fn buy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let buyer = claims.sub;
    let receipt = blocking(&state, move |db| db.purchase_listing(id, buyer)).await?;

    let entry = state.ledger.append(
        LedgerKind::Purchase,
        Some(receipt.buyer_id),
        Some(receipt.seller_id),
        receipt.price,
        Some(receipt.listing_id),
    );
    info!(
        "{} bought listing {} for {} coins (tx {})",
        claims.username, receipt.listing_id, receipt.price, entry.hash
    );

    push(&state.dispatcher, [receipt.seller_notification]).await;

    Ok(Json(PurchaseResponse {
        message: format!("You bought \"{}\"", receipt.title),
        listing_id: receipt.listing_id,
        price: receipt.price,
        buyer_coins: receipt.buyer_coins,
        transaction_hash: entry.hash,
    }))
}

pub async fn wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<WalletResponse>, ApiError> {
    let coins = blocking(&state, move |db| db.get_coins(claims.sub))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(WalletResponse { coins }))
}
