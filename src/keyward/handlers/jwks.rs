use crate::{auth::keys::PublicJwks, keyward::SharedKeyStore};
use axum::{
    extract::Extension,
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Json, Response},
};
use tracing::error;

#[utoipa::path(
    get,
    path= "/.well-known/jwks.json",
    responses (
        (status = 200, description = "Public signing keys, current first then legacy", body = PublicJwks),
        (status = 503, description = "Signing keys could not be loaded", body = String)
    ),
    tag= "oidc"
)]
pub async fn jwks(keys: Extension<SharedKeyStore>) -> Response {
    match keys.0.public_keys().await {
        Ok(jwks) => (
            [(CACHE_CONTROL, HeaderValue::from_static("public, max-age=300"))],
            Json(jwks),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to load signing keys: {err:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Signing keys unavailable".to_string(),
            )
                .into_response()
        }
    }
}
