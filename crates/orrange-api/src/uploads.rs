use axum::{Extension, Json};
use rand::Rng;
use tracing::debug;

use orrange_types::api::{Claims, UploadResponse};

/// No storage: every upload "succeeds" with a random stock photo.
pub async fn upload(Extension(claims): Extension<Claims>) -> Json<UploadResponse> {
    let url = stock_photo_url(&mut rand::rng());
    debug!("Simulated upload for {} -> {}", claims.sub, url);
    Json(UploadResponse { url })
}

fn stock_photo_url(rng: &mut impl Rng) -> String {
    format!("https://picsum.photos/seed/{}/800/600", rng.random_range(1..=10_000u32))
}
