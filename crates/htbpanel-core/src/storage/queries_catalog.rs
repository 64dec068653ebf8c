//! VPN server and tag queries.

use tracing::info;

use super::db::Database;
use super::models::NamedId;
use crate::api::{TagBatch, VpnRecord};
use crate::db::DatabaseError;
use crate::models::TagCategory;

impl Database {
    // =========================================================================
    // VPN servers
    // =========================================================================

    /// Cache VPN servers; already known ids are skipped.
    pub async fn add_vpns(&self, vpns: &[VpnRecord]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;
        for vpn in vpns {
            let result = sqlx::query("INSERT OR IGNORE INTO vpns (id, name) VALUES (?, ?)")
                .bind(vpn.id)
                .bind(&vpn.name)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        info!(received = vpns.len(), inserted, "Stored VPN servers");
        Ok(inserted)
    }

    pub async fn count_vpns(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vpns")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    pub async fn list_vpns(&self) -> Result<Vec<NamedId>, DatabaseError> {
        let vpns = sqlx::query_as::<_, NamedId>("SELECT name, id FROM vpns ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(vpns)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Insert tags and their machine links together.
    ///
    /// Tags are written first so every link finds its tag; known tags and
    /// links are skipped.
    pub async fn add_tags(&self, batch: &TagBatch) -> Result<u64, DatabaseError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        for tag in &batch.tags {
            if tag.name.trim().is_empty() {
                return Err(DatabaseError::InvalidRecord(format!("tag {} has no name", tag.id)));
            }
            sqlx::query("INSERT OR IGNORE INTO tags (id, category, name) VALUES (?, ?, ?)")
                .bind(tag.id)
                .bind(tag.category.as_str())
                .bind(&tag.name)
                .execute(&mut *tx)
                .await?;
        }

        let mut linked = 0;
        for (machine_id, tag_id) in &batch.links {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO machine_tag (machine_id, tag_id) VALUES (?, ?)",
            )
            .bind(machine_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
            linked += result.rows_affected();
        }
        tx.commit().await?;

        info!(tags = batch.tags.len(), linked, "Stored machine tags");
        Ok(linked)
    }

    /// `(name, id)` pairs of one tag category, ordered by name.
    pub async fn tags_by_category(
        &self,
        category: TagCategory,
    ) -> Result<Vec<NamedId>, DatabaseError> {
        let tags = sqlx::query_as::<_, NamedId>(
            "SELECT name, id FROM tags WHERE category = ? ORDER BY name",
        )
        .bind(category.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(tags)
    }
}
