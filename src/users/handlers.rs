use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::PublicUser,
        extractors::{AdminUser, AuthUser},
        repo::User,
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/avatar", patch(update_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024)) // 5MB avatars
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user)
}

/// PATCH /users/avatar (multipart `file` field). Admin only.
#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    mut mp: Multipart,
) -> AppResult<Json<PublicUser>> {
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("invalid multipart body: {}", e)))?;
            upload = Some((content_type, data));
        }
    }

    let Some((content_type, data)) = upload else {
        return Err(AppError::Validation("file field is required".into()));
    };

    let Some(ext) = ext_from_mime(&content_type) else {
        return Err(AppError::UnsupportedMedia(
            "Only jpeg, png and gif images are supported".into(),
        ));
    };

    let key = format!("avatars/{}/{}.{}", user.id, Uuid::new_v4(), ext);
    let url = state.storage.upload(&key, data, &content_type).await?;

    let updated = User::set_avatar(&state.db, user.id, &url).await?;
    state.cache.invalidate(user.id).await;

    info!(user_id = %user.id, url = %url, "avatar updated");
    Ok(Json(PublicUser::from(updated)))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
