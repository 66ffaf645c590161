use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{repo_types::User, services::AuthUser},
    error::AppError,
    links::repo_types::Link,
    profiles::{
        dto::{AvatarResponse, PublicLink, PublicProfile},
        repo_types::Profile,
        services,
    },
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/:handle", get(profile_page))
}

pub fn owner_routes() -> Router<AppState> {
    Router::new()
        .route("/profile/avatar", post(upload_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024)) // 5MB
}

/// The public path segment is `@handle`; anything else is not a profile page.
fn strip_handle_segment(segment: &str) -> Option<&str> {
    let handle = segment.strip_prefix('@')?;
    if handle.is_empty() {
        return None;
    }
    Some(handle)
}

/// GET /@:handle — public profile page, links ordered by (position, id).
#[instrument(skip(state))]
pub async fn profile_page(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<PublicProfile>, AppError> {
    let handle = strip_handle_segment(&segment)
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;

    let profile = Profile::find_by_handle(&state.db, handle)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;

    let links = Link::list_by_profile(&state.db, profile.id).await?;
    let avatar_url = services::presign_avatar(&state, profile.avatar_key.as_deref()).await?;

    Ok(Json(PublicProfile {
        handle: profile.handle,
        display_name: profile.display_name,
        bio: profile.bio,
        avatar_url,
        links: links
            .into_iter()
            .map(|l| PublicLink {
                title: l.title,
                url: l.url,
            })
            .collect(),
    }))
}

/// POST /profile/avatar — multipart field `avatar`, replaces the stored image.
#[instrument(skip(state, multipart))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let profile = owned_profile(&state, user_id).await?;

    let mut upload: Option<(Bytes, String)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("avatar") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|_| AppError::BadRequest("Invalid multipart body".into()))?;
            upload = Some((data, content_type));
        }
    }
    let (data, content_type) =
        upload.ok_or_else(|| AppError::BadRequest("avatar file is required".into()))?;

    let ext = services::avatar_ext_from_mime(&content_type)
        .ok_or_else(|| AppError::BadRequest("Unsupported image type".into()))?;

    let key = format!("avatars/{}/{}.{}", profile.id, Uuid::new_v4(), ext);
    state.storage.put_object(&key, data, &content_type).await?;

    if let Some(old) = profile.avatar_key.as_deref() {
        if let Err(e) = state.storage.delete_object(old).await {
            warn!(error = %e, key = old, "failed to delete previous avatar");
        }
    }
    Profile::set_avatar_key(&state.db, profile.id, Some(&key)).await?;

    let avatar_url = state.storage.presign_get(&key, 30 * 60).await?;
    info!(profile_id = %profile.id, key = %key, "avatar updated");
    Ok(Json(AvatarResponse { avatar_url }))
}

/// Resolve the caller's own profile, provisioning it on first access.
pub(crate) async fn owned_profile(
    state: &AppState,
    user_id: Uuid,
) -> Result<Profile, AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    services::get_or_create(&state.db, user.id, &user.email).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_segment_requires_at_prefix() {
        assert_eq!(strip_handle_segment("@nadia123"), Some("nadia123"));
        assert_eq!(strip_handle_segment("nadia123"), None);
        assert_eq!(strip_handle_segment("@"), None);
    }
}
