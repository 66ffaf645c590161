use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::links::repo_types::Link;

/// One row of the combined editor form. `order` is the caller-supplied
/// relative order value; ties keep submission order.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorRow {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub order: i64,
}

/// Combined profile-and-links editor submission.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorSubmit {
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub links: Vec<EditorRow>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLinkRequest {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct LinkItem {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub position: Option<i32>,
    pub created_at: OffsetDateTime,
}

impl From<Link> for LinkItem {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            title: link.title,
            url: link.url,
            position: link.position,
            created_at: link.created_at,
        }
    }
}

/// Editor state returned by GET /links and after a POST /links save.
#[derive(Debug, Serialize)]
pub struct EditorResponse {
    pub profile: EditorProfile,
    pub links: Vec<LinkItem>,
}

#[derive(Debug, Serialize)]
pub struct EditorProfile {
    pub id: Uuid,
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The reorder endpoint accepts either a JSON body or a form-encoded
/// body with repeated `ordered_ids[]` keys.
pub(crate) fn parse_reorder_payload(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Vec<Uuid>, String> {
    if content_type.is_some_and(|ct| ct.starts_with("application/json")) {
        let req: ReorderRequest =
            serde_json::from_slice(body).map_err(|_| "Invalid payload".to_string())?;
        return Ok(req.ordered_ids);
    }

    let mut ids = Vec::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        if key == "ordered_ids[]" || key == "ordered_ids" {
            ids.push(Uuid::parse_str(&value).map_err(|_| "Invalid payload".to_string())?);
        }
    }
    if ids.is_empty() {
        return Err("Invalid payload".to_string());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_shape() {
        let json = serde_json::to_string(&OkResponse { ok: true }).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);
    }

    #[test]
    fn editor_row_defaults() {
        let row: EditorRow =
            serde_json::from_str(r#"{"title":"Blog","url":"https://example.com"}"#).unwrap();
        assert!(row.id.is_none());
        assert!(!row.delete);
        assert_eq!(row.order, 0);
    }

    #[test]
    fn parses_json_reorder_body() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let body = format!(r#"{{"ordered_ids":["{a}","{b}"]}}"#);
        let ids = parse_reorder_payload(Some("application/json"), body.as_bytes()).unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn parses_empty_json_list() {
        let ids = parse_reorder_payload(Some("application/json"), br#"{"ordered_ids":[]}"#)
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_reorder_payload(Some("application/json"), b"{not json").is_err());
        assert!(parse_reorder_payload(
            Some("application/json"),
            br#"{"ordered_ids":["not-a-uuid"]}"#
        )
        .is_err());
    }

    #[test]
    fn parses_form_encoded_ids_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let body = format!("ordered_ids%5B%5D={a}&ordered_ids%5B%5D={b}");
        let ids =
            parse_reorder_payload(Some("application/x-www-form-urlencoded"), body.as_bytes())
                .unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn form_body_without_ids_is_rejected() {
        let err =
            parse_reorder_payload(Some("application/x-www-form-urlencoded"), b"other=1")
                .unwrap_err();
        assert_eq!(err, "Invalid payload");
    }
}
