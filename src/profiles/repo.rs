use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::profiles::repo_types::Profile;

const PROFILE_COLUMNS: &str =
    "id, user_id, handle, display_name, bio, avatar_key, created_at, updated_at";

impl Profile {
    /// Handle lookup is case-insensitive; handles are stored lowercase anyway.
    pub async fn find_by_handle(db: &PgPool, handle: &str) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE lower(handle) = lower($1)"
        ))
        .bind(handle)
        .fetch_optional(db)
        .await
        .context("find profile by handle")?;
        Ok(profile)
    }

    pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await
        .context("find profile by user")?;
        Ok(profile)
    }

    /// True when another profile already uses the handle (case-insensitive).
    pub async fn handle_taken(
        db: &PgPool,
        handle: &str,
        exclude_profile: Option<Uuid>,
    ) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM profiles
                WHERE lower(handle) = lower($1)
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(handle)
        .bind(exclude_profile)
        .fetch_one(db)
        .await
        .context("check handle taken")?;
        Ok(taken)
    }

    pub async fn insert(
        db: &PgPool,
        user_id: Uuid,
        handle: &str,
        display_name: &str,
    ) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (user_id, handle, display_name)
            VALUES ($1, $2, $3)
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(handle)
        .bind(display_name)
        .fetch_one(db)
        .await
        .context("insert profile")?;
        Ok(profile)
    }

    /// Row lock serializing concurrent writers of one profile's link set.
    pub async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(profile_id)
            .fetch_one(&mut **tx)
            .await
            .context("lock profile row")?;
        Ok(())
    }

    pub async fn update_fields(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
        handle: &str,
        display_name: &str,
        bio: &str,
    ) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles
            SET handle = $2, display_name = $3, bio = $4, updated_at = now()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(profile_id)
        .bind(handle)
        .bind(display_name)
        .bind(bio)
        .fetch_one(&mut **tx)
        .await
        .context("update profile fields")?;
        Ok(profile)
    }

    pub async fn set_avatar_key(
        db: &PgPool,
        profile_id: Uuid,
        avatar_key: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE profiles SET avatar_key = $2, updated_at = now() WHERE id = $1")
            .bind(profile_id)
            .bind(avatar_key)
            .execute(db)
            .await
            .context("set avatar key")?;
        Ok(())
    }
}
