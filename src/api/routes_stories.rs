use super::*;

use crate::story::store::{ArtifactError, StorySummary};
use crate::story::StoryDocument;

fn artifact_status(err: &ArtifactError) -> StatusCode {
    match err {
        ArtifactError::NotFound(_) => StatusCode::NOT_FOUND,
        ArtifactError::InvalidSlug(_) | ArtifactError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
        ArtifactError::Io(_) | ArtifactError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: serde::Serialize>(
    result: Result<T, ArtifactError>,
) -> (StatusCode, Json<ApiResponse<T>>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = artifact_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                warn!(err = %e, "artifact store failure");
            }
            (status, Json(ApiResponse::failure(e.to_string())))
        }
    }
}

pub(super) async fn list_stories(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<Vec<StorySummary>>>) {
    reply(state.artifacts().list())
}

pub(super) async fn get_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> (StatusCode, Json<ApiResponse<StoryDocument>>) {
    reply(state.artifacts().load(&slug))
}

pub(super) async fn story_exists(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Json<ApiResponse<ExistsResponse>> {
    let exists = state.artifacts().exists(&slug);
    Json(ApiResponse::success(ExistsResponse { slug, exists }))
}

pub(super) async fn list_story_media(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> (StatusCode, Json<ApiResponse<Vec<String>>>) {
    reply(state.artifacts().list_media(&slug))
}

pub(super) async fn delete_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    match state.artifacts().delete(&slug) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok())),
        Err(e) => (artifact_status(&e), Json(ApiResponse::err(e.to_string()))),
    }
}

pub(super) async fn get_emoji(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> axum::response::Response {
    let Some(path) = state.avatars.image_path(&file) else {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::err("Invalid file name"))).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            debug!(file = %file, err = %e, "emoji image not found");
            (StatusCode::NOT_FOUND, Json(ApiResponse::err("Not found"))).into_response()
        }
    }
}
