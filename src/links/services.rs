//! Position assignment for a profile's link list.
//!
//! Positions are dense (1..N) and unique per profile. Every mutator
//! serializes on the owning profile row lock, so an append can never
//! slip a new row in while a bulk renumber is mid-flight. Appends take
//! max+1; bulk renumbering first shifts every surviving position by a
//! large constant so the old and new ranges never collide on the
//! unique index mid-transaction.

use anyhow::Context;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, FieldError};
use crate::links::dto::{EditorRow, EditorSubmit};
use crate::links::repo_types::Link;
use crate::profiles::repo_types::Profile;
use crate::profiles::services::{
    handle_field_error, is_valid_handle, is_valid_link_url, normalize_handle, DISPLAY_NAME_MAX,
};

pub(crate) const RENUMBER_OFFSET: i32 = 1000;
pub(crate) const TITLE_MAX: usize = 100;

/// Next append position: max existing + 1, starting at 1 for an empty set.
pub(crate) fn next_position(max_existing: Option<i32>) -> i32 {
    max_existing.unwrap_or(0) + 1
}

/// The submitted ids must be exactly the profile's current link ids:
/// same cardinality, same membership, no duplicates.
pub(crate) fn verify_id_set(submitted: &[Uuid], current: &[Uuid]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(submitted.len());
    for id in submitted {
        if !seen.insert(*id) {
            return Err("Duplicate link id".to_string());
        }
    }
    if submitted.len() != current.len() || !current.iter().all(|id| seen.contains(id)) {
        return Err("IDs mismatch or unauthorized".to_string());
    }
    Ok(())
}

/// Indices of `order_values` sorted ascending; equal values keep
/// submission order (stable sort).
pub(crate) fn plan_order(order_values: &[i64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..order_values.len()).collect();
    indices.sort_by_key(|&i| order_values[i]);
    indices
}

/// Append a single link at the end of the profile's list.
pub async fn append_link(
    db: &PgPool,
    profile_id: Uuid,
    title: &str,
    url: &str,
) -> Result<Link, AppError> {
    let mut tx = db.begin().await.context("begin append tx")?;
    // Serializes concurrent appends so both cannot read the same max.
    Profile::lock_row(&mut tx, profile_id).await?;
    let max = Link::max_position(&mut tx, profile_id).await?;
    let link = Link::insert_at(&mut tx, profile_id, title, url, next_position(max)).await?;
    tx.commit().await.context("commit append tx")?;
    info!(profile_id = %profile_id, link_id = %link.id, position = ?link.position, "link appended");
    Ok(link)
}

/// Renumber the whole list to the submitted id order, atomically.
pub async fn reorder(
    db: &PgPool,
    profile_id: Uuid,
    ordered_ids: &[Uuid],
) -> Result<(), AppError> {
    let mut tx = db.begin().await.context("begin reorder tx")?;
    // Queue behind appends and other renumber runs for this profile.
    Profile::lock_row(&mut tx, profile_id).await?;
    let current = Link::ids_for_update(&mut tx, profile_id).await?;
    verify_id_set(ordered_ids, &current).map_err(AppError::BadRequest)?;

    Link::shift_positions(&mut tx, profile_id, RENUMBER_OFFSET).await?;
    for (index, link_id) in ordered_ids.iter().enumerate() {
        Link::assign_position(&mut tx, *link_id, (index + 1) as i32).await?;
    }
    tx.commit().await.context("commit reorder tx")?;
    info!(profile_id = %profile_id, count = ordered_ids.len(), "links reordered");
    Ok(())
}

pub(crate) fn validate_link_fields(errors: &mut Vec<FieldError>, prefix: &str, title: &str, url: &str) {
    let title = title.trim();
    if title.is_empty() {
        errors.push(FieldError::new(
            format!("{prefix}.title"),
            "Title is required.",
        ));
    } else if title.chars().count() > TITLE_MAX {
        errors.push(FieldError::new(
            format!("{prefix}.title"),
            format!("Title must be at most {TITLE_MAX} characters."),
        ));
    }
    if !is_valid_link_url(url.trim()) {
        errors.push(FieldError::new(
            format!("{prefix}.url"),
            "Enter a valid http or https URL.",
        ));
    }
}

/// Field-level validation of the combined editor submission. Rows marked
/// for deletion are not validated.
pub(crate) fn validate_editor(submit: &EditorSubmit) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !is_valid_handle(&normalize_handle(&submit.handle)) {
        errors.push(handle_field_error());
    }

    let display_name = submit.display_name.trim();
    if display_name.is_empty() {
        errors.push(FieldError::new("display_name", "Display name is required."));
    } else if display_name.chars().count() > DISPLAY_NAME_MAX {
        errors.push(FieldError::new(
            "display_name",
            format!("Display name must be at most {DISPLAY_NAME_MAX} characters."),
        ));
    }

    for (i, row) in submit.links.iter().enumerate() {
        if row.delete {
            continue;
        }
        validate_link_fields(&mut errors, &format!("links[{i}]"), &row.title, &row.url);
    }
    errors
}

/// Combined profile-and-links editor submission, one atomic transaction:
/// profile fields, deletions, offset shift, stable reorder, renumber 1..N.
pub async fn apply_editor(
    db: &PgPool,
    profile: &Profile,
    submit: EditorSubmit,
) -> Result<Profile, AppError> {
    let errors = validate_editor(&submit);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let handle = normalize_handle(&submit.handle);
    let display_name = submit.display_name.trim().to_string();

    // Pre-check against other profiles; the unique index on lower(handle)
    // still backstops the race inside the transaction.
    if handle != profile.handle && Profile::handle_taken(db, &handle, Some(profile.id)).await? {
        return Err(AppError::field("handle", "Handle already taken."));
    }

    let mut tx = db.begin().await.context("begin editor tx")?;
    // A concurrent append committing between our id snapshot and the
    // offset shift would leave its row stranded above the offset;
    // taking the same profile row lock as append_link rules that out.
    Profile::lock_row(&mut tx, profile.id).await?;

    let current_ids = Link::ids_for_update(&mut tx, profile.id).await?;
    let submitted_ids: Vec<Uuid> = submit.links.iter().filter_map(|r| r.id).collect();
    // Every existing row must appear in the submission (deletions included),
    // otherwise a survivor would escape renumbering.
    verify_id_set(&submitted_ids, &current_ids).map_err(AppError::BadRequest)?;

    let updated =
        Profile::update_fields(&mut tx, profile.id, &handle, &display_name, submit.bio.trim())
            .await?;

    for row in submit.links.iter().filter(|r| r.delete) {
        if let Some(id) = row.id {
            Link::delete_in_tx(&mut tx, id).await?;
        }
    }

    Link::shift_positions(&mut tx, profile.id, RENUMBER_OFFSET).await?;

    let mut survivors: Vec<(i64, Uuid)> = Vec::new();
    for row in submit.links.iter().filter(|r| !r.delete) {
        let EditorRow { id, title, url, order, .. } = row;
        let title = title.trim();
        let url = url.trim();
        let link_id = match id {
            Some(id) => {
                Link::update_fields(&mut tx, *id, title, url).await?;
                *id
            }
            None => {
                Link::insert_unpositioned(&mut tx, profile.id, title, url)
                    .await?
                    .id
            }
        };
        survivors.push((*order, link_id));
    }

    let order_values: Vec<i64> = survivors.iter().map(|(order, _)| *order).collect();
    for (position0, &index) in plan_order(&order_values).iter().enumerate() {
        Link::assign_position(&mut tx, survivors[index].1, (position0 + 1) as i32).await?;
    }

    tx.commit().await.context("commit editor tx")?;
    info!(profile_id = %profile.id, links = survivors.len(), "editor submission applied");
    Ok(updated)
}


#[cfg(test)]
mod id_set_tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn accepts_exact_permutation() {
        let current = ids(3);
        let submitted = vec![current[2], current[0], current[1]];
        assert!(verify_id_set(&submitted, &current).is_ok());
    }

    #[test]
    fn accepts_empty_sets() {
        assert!(verify_id_set(&[], &[]).is_ok());
    }

    #[test]
    fn rejects_missing_id() {
        let current = ids(3);
        let submitted = vec![current[0], current[1]];
        assert!(verify_id_set(&submitted, &current).is_err());
    }

    #[test]
    fn rejects_foreign_id() {
        let current = ids(2);
        let submitted = vec![current[0], current[1], Uuid::new_v4()];
        assert!(verify_id_set(&submitted, &current).is_err());
    }

    #[test]
    fn rejects_swapped_in_foreign_id_at_same_cardinality() {
        let current = ids(2);
        let submitted = vec![current[0], Uuid::new_v4()];
        assert!(verify_id_set(&submitted, &current).is_err());
    }

    #[test]
    fn rejects_duplicate_id() {
        let current = ids(2);
        let submitted = vec![current[0], current[0]];
        let err = verify_id_set(&submitted, &current).unwrap_err();
        assert!(err.contains("Duplicate"));
    }
}

// Database tests: run with `cargo test -- --ignored` against a scratch
// Postgres pointed to by DATABASE_URL.
#[cfg(test)]
mod locking_tests {
    use super::*;
    use crate::auth::repo_types::User;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for database tests");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("apply migrations");
        pool
    }

    async fn seeded_profile(db: &PgPool) -> Profile {
        let tag = Uuid::new_v4().as_simple().to_string();
        let user = User::create(db, &format!("lock-{tag}@example.com"), "x")
            .await
            .expect("create user");
        Profile::insert(db, user.id, &format!("u{}", &tag[..8]), "Lock Test")
            .await
            .expect("create profile")
    }

    #[tokio::test]
    #[ignore]
    async fn bulk_renumber_serializes_against_append() {
        let db = test_pool().await;
        let profile = seeded_profile(&db).await;
        for name in ["a", "b", "c"] {
            append_link(&db, profile.id, name, &format!("https://example.com/{name}"))
                .await
                .expect("seed link");
        }

        // Open a renumber transaction the way reorder/apply_editor do.
        let mut tx = db.begin().await.expect("begin");
        Profile::lock_row(&mut tx, profile.id).await.expect("lock");
        let current = Link::ids_for_update(&mut tx, profile.id)
            .await
            .expect("snapshot ids");

        let appender = tokio::spawn({
            let db = db.clone();
            let profile_id = profile.id;
            async move { append_link(&db, profile_id, "d", "https://example.com/d").await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            !appender.is_finished(),
            "append must queue behind the profile row lock"
        );

        Link::shift_positions(&mut tx, profile.id, RENUMBER_OFFSET)
            .await
            .expect("shift");
        for (index, link_id) in current.iter().rev().enumerate() {
            Link::assign_position(&mut tx, *link_id, (index + 1) as i32)
                .await
                .expect("assign");
        }
        tx.commit().await.expect("commit");

        appender
            .await
            .expect("join appender")
            .expect("append after lock release");

        // No row may be stranded above the offset; positions stay dense.
        let positions: Vec<i32> = Link::list_by_profile(&db, profile.id)
            .await
            .expect("list links")
            .into_iter()
            .filter_map(|l| l.position)
            .collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }
}

#[cfg(test)]
mod editor_validation_tests {
    use super::*;

    fn row(title: &str, url: &str) -> EditorRow {
        EditorRow {
            id: None,
            title: title.into(),
            url: url.into(),
            delete: false,
            order: 0,
        }
    }

    fn submit(rows: Vec<EditorRow>) -> EditorSubmit {
        EditorSubmit {
            handle: "nadia123".into(),
            display_name: "Nadia".into(),
            bio: String::new(),
            links: rows,
        }
    }

    #[test]
    fn clean_submission_passes() {
        let s = submit(vec![row("Blog", "https://example.com")]);
        assert!(validate_editor(&s).is_empty());
    }

    #[test]
    fn handle_is_normalized_before_validation() {
        let mut s = submit(vec![]);
        s.handle = "  Nadia123 ".into();
        assert!(validate_editor(&s).is_empty());
    }

    #[test]
    fn bad_handle_is_a_field_error() {
        let mut s = submit(vec![]);
        s.handle = "no".into();
        let errors = validate_editor(&s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "handle");
    }

    #[test]
    fn link_rows_are_validated_by_index() {
        let s = submit(vec![
            row("Blog", "https://example.com"),
            row("", "ftp://example.com"),
        ]);
        let errors = validate_editor(&s);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["links[1].title", "links[1].url"]);
    }

    #[test]
    fn oversized_title_rejected() {
        let s = submit(vec![row(&"x".repeat(TITLE_MAX + 1), "https://example.com")]);
        let errors = validate_editor(&s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "links[0].title");
    }

    #[test]
    fn deleted_rows_are_not_validated() {
        let mut bad = row("", "garbage");
        bad.delete = true;
        let s = submit(vec![bad]);
        assert!(validate_editor(&s).is_empty());
    }

    #[test]
    fn long_display_name_rejected() {
        let mut s = submit(vec![]);
        s.display_name = "n".repeat(DISPLAY_NAME_MAX + 1);
        let errors = validate_editor(&s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "display_name");
    }
}
