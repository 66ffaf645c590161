use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, FieldError};
use crate::profiles::repo_types::Profile;
use crate::state::AppState;

pub const HANDLE_MIN: usize = 5;
pub const HANDLE_MAX: usize = 15;
pub const DISPLAY_NAME_MAX: usize = 50;

const AVATAR_PRESIGN_SECS: u64 = 30 * 60;

lazy_static! {
    static ref HANDLE_RE: Regex = Regex::new(r"^[a-z0-9_]{5,15}$").unwrap();
}

/// Handles are stored trimmed and lowercased.
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE_RE.is_match(handle)
}

pub fn is_valid_link_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

pub(crate) fn handle_field_error() -> FieldError {
    FieldError::new(
        "handle",
        "Handle must be 5-15 chars, lowercase letters, numbers, or underscore.",
    )
}

/// Derive a starting handle from the email local part; falls back to a
/// user-id based handle when too little survives sanitizing.
pub(crate) fn handle_from_email(email: &str, user_id: Uuid) -> String {
    let local = email.split('@').next().unwrap_or("");
    let mut base: String = local
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if matches!(c, '.' | '-' | '+') { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    base.truncate(HANDLE_MAX);
    if base.len() < HANDLE_MIN {
        base = format!("user_{}", &user_id.as_simple().to_string()[..8]);
    }
    base
}

/// Provisioned display name: the email local part, capped so the fresh
/// profile already passes the editor's own length check.
pub(crate) fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("").trim();
    if local.is_empty() {
        return "New user".to_string();
    }
    local.chars().take(DISPLAY_NAME_MAX).collect()
}

/// Candidate `n` for a base handle, truncated so the suffix still fits.
pub(crate) fn numbered_handle(base: &str, n: u32) -> String {
    if n == 0 {
        return base.to_string();
    }
    let suffix = n.to_string();
    let keep = HANDLE_MAX.saturating_sub(suffix.len());
    let mut handle: String = base.chars().take(keep).collect();
    handle.push_str(&suffix);
    handle
}

/// Lazy provisioning: the profile is created on first authenticated access.
pub async fn get_or_create(
    db: &PgPool,
    user_id: Uuid,
    email: &str,
) -> Result<Profile, AppError> {
    if let Some(profile) = Profile::find_by_user(db, user_id).await? {
        return Ok(profile);
    }

    let base = handle_from_email(email, user_id);
    let display_name = display_name_from_email(email);

    for n in 0..100u32 {
        let candidate = numbered_handle(&base, n);
        if Profile::handle_taken(db, &candidate, None).await? {
            continue;
        }
        let profile = Profile::insert(db, user_id, &candidate, &display_name).await?;
        info!(user_id = %user_id, handle = %profile.handle, "profile provisioned");
        return Ok(profile);
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "could not find a free handle for user {user_id}"
    )))
}

pub async fn presign_avatar(
    state: &AppState,
    avatar_key: Option<&str>,
) -> anyhow::Result<Option<String>> {
    match avatar_key {
        Some(key) => Ok(Some(
            state.storage.presign_get(key, AVATAR_PRESIGN_SECS).await?,
        )),
        None => Ok(None),
    }
}

pub(crate) fn avatar_ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod handle_tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize_handle("  Nadia123 "), "nadia123");
    }

    #[test]
    fn valid_handles() {
        assert!(is_valid_handle("nadia123"));
        assert!(is_valid_handle("a_b_c"));
        assert!(is_valid_handle("user_1a2b3c4d"));
    }

    #[test]
    fn invalid_handles() {
        assert!(!is_valid_handle("abcd")); // too short
        assert!(!is_valid_handle("abcdefghijklmnop")); // too long
        assert!(!is_valid_handle("Nadia123")); // uppercase
        assert!(!is_valid_handle("na dia")); // space
        assert!(!is_valid_handle("nad-ia")); // dash
    }

    #[test]
    fn handle_from_email_sanitizes_local_part() {
        let id = Uuid::new_v4();
        assert_eq!(
            handle_from_email("Nadia.Smith+x@example.com", id),
            "nadia_smith_x"
        );
        assert_eq!(
            handle_from_email("averyverylongemailaddress@example.com", id).len(),
            HANDLE_MAX
        );
    }

    #[test]
    fn handle_from_email_falls_back_for_short_locals() {
        let id = Uuid::new_v4();
        let handle = handle_from_email("ab@example.com", id);
        assert!(is_valid_handle(&handle), "fallback {handle} must be valid");
        assert!(handle.starts_with("user_"));
    }

    #[test]
    fn display_name_from_email_uses_local_part() {
        assert_eq!(display_name_from_email("Nadia.Smith@example.com"), "Nadia.Smith");
        assert_eq!(display_name_from_email("@example.com"), "New user");
    }

    #[test]
    fn display_name_from_email_caps_long_local_parts() {
        let email = format!("{}@example.com", "n".repeat(DISPLAY_NAME_MAX + 20));
        let name = display_name_from_email(&email);
        assert_eq!(name.chars().count(), DISPLAY_NAME_MAX);
    }

    #[test]
    fn numbered_handles_stay_within_bounds() {
        assert_eq!(numbered_handle("nadia", 0), "nadia");
        assert_eq!(numbered_handle("nadia", 3), "nadia3");
        let long = "abcdefghijklmno"; // 15 chars
        let candidate = numbered_handle(long, 42);
        assert_eq!(candidate, "abcdefghijklm42");
        assert!(is_valid_handle(&candidate));
    }
}

#[cfg(test)]
mod url_tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_link_url("https://example.com"));
        assert!(is_valid_link_url("http://example.com/path?x=1"));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(!is_valid_link_url("ftp://example.com"));
        assert!(!is_valid_link_url("javascript:alert(1)"));
        assert!(!is_valid_link_url("not a url"));
        assert!(!is_valid_link_url(""));
    }
}

#[cfg(test)]
mod avatar_tests {
    use super::*;

    #[test]
    fn avatar_mime_mapping() {
        assert_eq!(avatar_ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(avatar_ext_from_mime("image/png"), Some("png"));
        assert_eq!(avatar_ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(avatar_ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn presign_uses_storage_client() {
        let state = crate::state::AppState::fake();
        let url = presign_avatar(&state, Some("avatars/a/b.jpg"))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://fake.local/avatars/a/b.jpg"));
        assert!(presign_avatar(&state, None).await.unwrap().is_none());
    }
}
