use axum::Json;

use crate::error::ApiResponse;

pub async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::ok())
}
