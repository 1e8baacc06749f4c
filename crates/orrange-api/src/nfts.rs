use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sha2::{Digest, Sha256};

use orrange_db::models::NftRow;
use orrange_types::api::{Claims, MintNftRequest, TransferNftRequest};
use orrange_types::models::{LedgerKind, Nft};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::push;
use crate::users::ensure_user;

fn to_nfts(rows: Vec<NftRow>) -> Vec<Nft> {
    rows.into_iter().map(NftRow::into_nft).collect()
}

/// Unique token id: sha256 over the minter, the name and a random nonce.
fn token_hash(owner_id: i64, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.to_be_bytes());
    hasher.update(name.as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

pub async fn mint(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MintNftRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("NFT name is required"));
    }

    let me = claims.sub;
    let hash = token_hash(me, &name);
    let row = blocking(&state, move |db| {
        db.mint_nft(me, &name, req.description.as_deref(), req.image_url.as_deref(), &hash)
    })
    .await?;

    state.ledger.append(LedgerKind::Mint, None, Some(me), 0, Some(row.id));

    Ok((StatusCode::CREATED, Json(row.into_nft())))
}

pub async fn list_nfts(State(state): State<AppState>) -> Result<Json<Vec<Nft>>, ApiError> {
    let rows = blocking(&state, |db| db.list_nfts(None)).await?;
    Ok(Json(to_nfts(rows)))
}

pub async fn my_nfts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Nft>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_nfts(Some(claims.sub))).await?;
    Ok(Json(to_nfts(rows)))
}

pub async fn transfer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TransferNftRequest>,
) -> Result<Json<Nft>, ApiError> {
    let me = claims.sub;
    let to = req.to_user_id;
    ensure_user(&state, to).await?;

    let (row, notification) = blocking(&state, move |db| db.transfer_nft(id, me, to)).await?;

    state.ledger.append(LedgerKind::Transfer, Some(me), Some(to), 0, Some(row.id));
    push(&state.dispatcher, [notification]).await;

    Ok(Json(row.into_nft()))
}

#[cfg(test)]
mod tests {
    use super::token_hash;

    #[test]
    fn token_hashes_are_unique() {
        let a = token_hash(1, "sunset");
        let b = token_hash(1, "sunset");
        assert_ne!(a, b);
        assert_eq!(a.len(), 66);
    }
}
