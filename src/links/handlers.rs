use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::services::AuthUser,
    error::{AppError, FieldError},
    links::{
        dto::{
            parse_reorder_payload, CreateLinkRequest, EditorProfile, EditorResponse,
            EditorSubmit, LinkItem, OkResponse, UpdateLinkRequest,
        },
        repo_types::Link,
        services,
    },
    profiles::{handlers::owned_profile, repo_types::Profile, services::presign_avatar},
    state::AppState,
};

pub fn editor_routes() -> Router<AppState> {
    Router::new()
        .route("/links", get(get_editor).post(submit_editor))
        .route("/links/new", post(create_link))
        .route("/links/:id", put(update_link).delete(delete_link))
        .route("/links/reorder", post(reorder_links))
}

async fn editor_state(state: &AppState, profile: Profile) -> Result<EditorResponse, AppError> {
    let links = Link::list_by_profile(&state.db, profile.id).await?;
    let avatar_url = presign_avatar(state, profile.avatar_key.as_deref()).await?;
    Ok(EditorResponse {
        profile: EditorProfile {
            id: profile.id,
            handle: profile.handle,
            display_name: profile.display_name,
            bio: profile.bio,
            avatar_url,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        },
        links: links.into_iter().map(LinkItem::from).collect(),
    })
}

/// GET /links — editor state; provisions the profile on first access.
#[instrument(skip(state))]
pub async fn get_editor(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<EditorResponse>, AppError> {
    let profile = owned_profile(&state, user_id).await?;
    Ok(Json(editor_state(&state, profile).await?))
}

/// POST /links — combined profile-and-links editor submission.
#[instrument(skip(state, payload))]
pub async fn submit_editor(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<EditorSubmit>,
) -> Result<Json<EditorResponse>, AppError> {
    let profile = owned_profile(&state, user_id).await?;
    let updated = services::apply_editor(&state.db, &profile, payload).await?;
    Ok(Json(editor_state(&state, updated).await?))
}

/// POST /links/new — append one link at the end of the list.
#[instrument(skip(state, payload))]
pub async fn create_link(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkItem>), AppError> {
    validate_link_payload(&payload.title, &payload.url)?;
    let profile = owned_profile(&state, user_id).await?;
    let link = services::append_link(
        &state.db,
        profile.id,
        payload.title.trim(),
        payload.url.trim(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(LinkItem::from(link))))
}

/// PUT /links/:id — update title/url of one owned link.
#[instrument(skip(state, payload))]
pub async fn update_link(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(link_id): Path<Uuid>,
    Json(payload): Json<UpdateLinkRequest>,
) -> Result<Json<LinkItem>, AppError> {
    validate_link_payload(&payload.title, &payload.url)?;
    let link = owned_link(&state, user_id, link_id).await?;

    let mut tx = state.db.begin().await.map_err(anyhow::Error::from)?;
    Link::update_fields(&mut tx, link.id, payload.title.trim(), payload.url.trim()).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let updated = Link::find_by_id(&state.db, link.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Link not found".into()))?;
    Ok(Json(LinkItem::from(updated)))
}

/// DELETE /links/:id — remove one owned link. Survivors keep their
/// positions; the next append still computes old max + 1.
#[instrument(skip(state))]
pub async fn delete_link(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(link_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let link = owned_link(&state, user_id, link_id).await?;
    Link::delete(&state.db, link.id).await?;
    info!(link_id = %link.id, "link deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /links/reorder — JSON `{"ordered_ids":[…]}` or form-encoded
/// `ordered_ids[]`; replies `{"ok":true}` or 400 with a plain reason.
#[instrument(skip(state, headers, body))]
pub async fn reorder_links(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OkResponse>, AppError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let ordered_ids =
        parse_reorder_payload(content_type, &body).map_err(AppError::BadRequest)?;

    let profile = owned_profile(&state, user_id).await?;
    services::reorder(&state.db, profile.id, &ordered_ids).await?;
    Ok(Json(OkResponse { ok: true }))
}

fn validate_link_payload(title: &str, url: &str) -> Result<(), AppError> {
    let mut errors: Vec<FieldError> = Vec::new();
    services::validate_link_fields(&mut errors, "link", title, url);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// 404 for unknown ids, 403 when the link belongs to someone else.
async fn owned_link(
    state: &AppState,
    user_id: Uuid,
    link_id: Uuid,
) -> Result<Link, AppError> {
    let link = Link::find_by_id(&state.db, link_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Link not found".into()))?;
    let profile = owned_profile(state, user_id).await?;
    if link.profile_id != profile.id {
        return Err(AppError::Forbidden("Not your link".into()));
    }
    Ok(link)
}
