use crate::auth::check_session::CHECK_SESSION_HTML;
use axum::{
    http::{HeaderValue, header::CONTENT_TYPE},
    response::IntoResponse,
};

#[utoipa::path(
    get,
    path= "/oidc/check-session",
    responses (
        (status = 200, description = "OIDC check-session iframe", content_type = "text/html", body = String)
    ),
    tag= "oidc"
)]
pub async fn check_session() -> impl IntoResponse {
    (
        [(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        CHECK_SESSION_HTML,
    )
}
