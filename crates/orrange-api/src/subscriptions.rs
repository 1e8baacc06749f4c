use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use orrange_db::models::SubscriptionRow;
use orrange_types::api::{Claims, SubscribeRequest};
use orrange_types::models::{LedgerKind, Subscription};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::push;

pub async fn subscribe(
    State(state): State<AppState>,
    Path(creator_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.price <= 0 {
        return Err(ApiError::bad_request("Price must be greater than zero"));
    }

    let me = claims.sub;
    let price = req.price;
    let (row, notification) = blocking(&state, move |db| db.subscribe(me, creator_id, price)).await?;

    state
        .ledger
        .append(LedgerKind::Subscription, Some(me), Some(creator_id), price, Some(row.id));
    push(&state.dispatcher, [notification]).await;

    Ok((StatusCode::CREATED, Json(row.into_subscription())))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_subscriptions(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(SubscriptionRow::into_subscription).collect()))
}
