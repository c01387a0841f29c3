//! Series endpoint

use axum::{extract::State, Extension, Json};

use crate::auth::Principal;
use crate::error::ApiResult;
use crate::services::series::{list_series, Series};
use crate::AppState;

/// GET /api/series
pub async fn get_series(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<Series>>> {
    let series = list_series(state.store.as_ref(), &principal.owner).await?;
    Ok(Json(series))
}
