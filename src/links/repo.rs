use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::links::repo_types::Link;

const LINK_COLUMNS: &str = "id, profile_id, title, url, position, created_at";

impl Link {
    /// Display order: (position, id) ascending.
    pub async fn list_by_profile(db: &PgPool, profile_id: Uuid) -> anyhow::Result<Vec<Link>> {
        let rows = sqlx::query_as::<_, Link>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE profile_id = $1
            ORDER BY position, id
            "#
        ))
        .bind(profile_id)
        .fetch_all(db)
        .await
        .context("list links by profile")?;
        Ok(rows)
    }

    pub async fn find_by_id(db: &PgPool, link_id: Uuid) -> anyhow::Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE id = $1"
        ))
        .bind(link_id)
        .fetch_optional(db)
        .await
        .context("find link by id")?;
        Ok(link)
    }

    /// Lock and return the ids of all links of a profile.
    pub async fn ids_for_update(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
    ) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM links WHERE profile_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(profile_id)
        .fetch_all(&mut **tx)
        .await
        .context("lock link ids")?;
        Ok(ids)
    }

    /// Highest assigned position, None when the profile has no links.
    pub async fn max_position(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
    ) -> anyhow::Result<Option<i32>> {
        let max = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(position) FROM links WHERE profile_id = $1",
        )
        .bind(profile_id)
        .fetch_one(&mut **tx)
        .await
        .context("max link position")?;
        Ok(max)
    }

    pub async fn insert_at(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
        title: &str,
        url: &str,
        position: i32,
    ) -> anyhow::Result<Link> {
        let link = sqlx::query_as::<_, Link>(&format!(
            r#"
            INSERT INTO links (profile_id, title, url, position)
            VALUES ($1, $2, $3, $4)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(profile_id)
        .bind(title)
        .bind(url)
        .bind(position)
        .fetch_one(&mut **tx)
        .await
        .context("insert link")?;
        Ok(link)
    }

    /// Insert without a position; the assigner numbers it before commit.
    pub async fn insert_unpositioned(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
        title: &str,
        url: &str,
    ) -> anyhow::Result<Link> {
        let link = sqlx::query_as::<_, Link>(&format!(
            r#"
            INSERT INTO links (profile_id, title, url)
            VALUES ($1, $2, $3)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(profile_id)
        .bind(title)
        .bind(url)
        .fetch_one(&mut **tx)
        .await
        .context("insert unpositioned link")?;
        Ok(link)
    }

    pub async fn update_fields(
        tx: &mut Transaction<'_, Postgres>,
        link_id: Uuid,
        title: &str,
        url: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE links SET title = $2, url = $3 WHERE id = $1")
            .bind(link_id)
            .bind(title)
            .bind(url)
            .execute(&mut **tx)
            .await
            .context("update link fields")?;
        Ok(())
    }

    pub async fn delete(db: &PgPool, link_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(link_id)
            .execute(db)
            .await
            .context("delete link")?;
        Ok(())
    }

    pub async fn delete_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        link_id: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(link_id)
            .execute(&mut **tx)
            .await
            .context("delete link")?;
        Ok(())
    }

    /// Bulk-shift every assigned position of a profile. Used with a large
    /// offset so old and new ranges cannot collide on the unique index.
    pub async fn shift_positions(
        tx: &mut Transaction<'_, Postgres>,
        profile_id: Uuid,
        offset: i32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE links
            SET position = position + $2
            WHERE profile_id = $1 AND position IS NOT NULL
            "#,
        )
        .bind(profile_id)
        .bind(offset)
        .execute(&mut **tx)
        .await
        .context("shift link positions")?;
        Ok(())
    }

    pub async fn assign_position(
        tx: &mut Transaction<'_, Postgres>,
        link_id: Uuid,
        position: i32,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE links SET position = $2 WHERE id = $1")
            .bind(link_id)
            .bind(position)
            .execute(&mut **tx)
            .await
            .context("assign link position")?;
        Ok(())
    }
}
