//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_code_handler,
    ),
    components(
        schemas(GenerateCodeResponse, GenerateCodeError)
    ),
    tags(
        (name = "DeChat API", description = "API endpoints for the phrase-based chat service.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A freshly generated room code: two room-identifying phrases plus a host
/// password.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeResponse {
    first_phrase: String,
    second_phrase: String,
    host_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateCodeError {
    error: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Generate a fresh, unused room code.
///
/// Draws three distinct dictionary words and verifies that the room
/// identifier derived from the first two is not already in use.
#[utoipa::path(
    get,
    path = "/generate-code",
    responses(
        (status = 200, description = "Code generated successfully", body = GenerateCodeResponse),
        (status = 500, description = "Generation attempts exhausted", body = GenerateCodeError)
    )
)]
pub async fn generate_code_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<GenerateCodeError>)> {
    match app_state.codegen.generate().await {
        Ok(code) => Ok(Json(GenerateCodeResponse {
            first_phrase: code.first_phrase,
            second_phrase: code.second_phrase,
            host_password: code.host_password,
        })),
        Err(e) => {
            error!("Failed to generate room code: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GenerateCodeError {
                    error: "Failed to generate code".to_string(),
                }),
            ))
        }
    }
}
