//! Machine catalog queries.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info};

use super::db::Database;
use super::filters::{MachineFilters, Predicate, push_where};
use super::models::{Machine, MachineListing, MachineListingRow, NamedId};
use crate::api::{MachineBatch, MachineRecord};
use crate::db::DatabaseError;
use crate::models::OwnType;

const LISTING_SELECT: &str = "SELECT machines.name, machines.difficulty, machines.os, \
     machines.free, machines.user_own, machines.root_own, \
     GROUP_CONCAT(tags.name, ',') AS tags \
     FROM machines \
     LEFT JOIN machine_tag ON machine_tag.machine_id = machines.id \
     LEFT JOIN tags ON tags.id = machine_tag.tag_id";

const LISTING_ORDER: &str = " GROUP BY machines.id ORDER BY machines.free DESC, machines.name";

fn check_record(record: &MachineRecord) -> Result<(), DatabaseError> {
    if record.name.trim().is_empty() {
        return Err(DatabaseError::InvalidRecord(format!(
            "machine {} has no name",
            record.id
        )));
    }
    if record.os.trim().is_empty() {
        return Err(DatabaseError::InvalidRecord(format!(
            "machine {} ({}) has no os",
            record.id, record.name
        )));
    }
    Ok(())
}

async fn reset_flags(conn: &mut SqliteConnection) -> Result<u64, DatabaseError> {
    let result = sqlx::query("UPDATE machines SET free = 0, active = 0")
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// `UPDATE machines SET <assignments> WHERE id IN (...)`; empty `ids` is a no-op.
async fn set_flags(
    conn: &mut SqliteConnection,
    assignments: &str,
    ids: &[i64],
) -> Result<u64, DatabaseError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE machines SET ");
    qb.push(assignments).push(" WHERE id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");
    let result = qb.build().execute(conn).await?;
    Ok(result.rows_affected())
}

impl Database {
    // =========================================================================
    // Catalog writes
    // =========================================================================

    /// Insert every machine of the batch whose id is not cached yet.
    ///
    /// Existing rows are never touched. The whole batch is checked before
    /// anything is written; one bad record aborts it.
    pub async fn add_machines(&self, batch: &MachineBatch) -> Result<u64, DatabaseError> {
        for record in batch.active.iter().chain(&batch.retired) {
            check_record(record)?;
        }

        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;
        let listings = [(&batch.active, true), (&batch.retired, false)];
        for (records, active) in listings {
            for m in records {
                let result = sqlx::query(
                    r"
                    INSERT OR IGNORE INTO machines
                        (id, name, difficulty, os, free, active, user_own, root_own)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .bind(m.id)
                .bind(&m.name)
                .bind(m.difficulty.as_str())
                .bind(&m.os)
                .bind(m.free)
                .bind(active)
                .bind(m.user_owned)
                .bind(m.root_owned)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
        }
        tx.commit().await?;

        info!(received = batch.len(), inserted, "Stored machines");
        Ok(inserted)
    }

    pub async fn count_machines(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM machines")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Clear `free` and `active` on every machine.
    pub async fn reset_availability(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        reset_flags(&mut *conn).await?;
        Ok(())
    }

    /// Mark exactly `ids` as running; active machines are always free.
    pub async fn mark_active(&self, ids: &[i64]) -> Result<(), DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        set_flags(&mut *conn, "active = 1, free = 1", ids).await?;
        Ok(())
    }

    pub async fn mark_free(&self, ids: &[i64]) -> Result<(), DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        set_flags(&mut *conn, "free = 1", ids).await?;
        Ok(())
    }

    /// Reset availability and re-mark `active_ids` and `free_ids` in one
    /// transaction, so no reader observes the cleared state.
    pub async fn apply_availability(
        &self,
        active_ids: &[i64],
        free_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;
        reset_flags(&mut *tx).await?;
        let active = set_flags(&mut *tx, "active = 1, free = 1", active_ids).await?;
        let free = set_flags(&mut *tx, "free = 1", free_ids).await?;
        tx.commit().await?;

        debug!(active, free, "Recomputed availability");
        Ok(())
    }

    /// Set one ownership flag. Already-owned flags stay owned.
    pub async fn set_owned(&self, id: i64, own_type: OwnType) -> Result<(), DatabaseError> {
        let sql = match own_type {
            OwnType::User => "UPDATE machines SET user_own = 1 WHERE id = ?",
            OwnType::Root => "UPDATE machines SET root_own = 1 WHERE id = ?",
        };
        let result = sqlx::query(sql).bind(id).execute(self.pool()).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Machine {id}")));
        }
        debug!(machine_id = id, %own_type, "Marked flag owned");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Ids of the machines recorded as currently playable.
    pub async fn active_machine_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let ids = sqlx::query_scalar("SELECT id FROM machines WHERE active = 1 ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    pub async fn machine_name(&self, id: i64) -> Result<String, DatabaseError> {
        sqlx::query_scalar("SELECT name FROM machines WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Machine {id}")))
    }

    /// Resolve a machine by numeric id or case-insensitive exact name.
    pub async fn find_machine(&self, reference: &str) -> Result<Machine, DatabaseError> {
        let reference = reference.trim();
        let found = if let Ok(id) = reference.parse::<i64>() {
            sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?
        } else {
            sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE lower(name) = lower(?)")
                .bind(reference)
                .fetch_optional(self.pool())
                .await?
        };
        found.ok_or_else(|| DatabaseError::NotFound(format!("Machine {reference}")))
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// Every machine with its tags, free machines first then by name.
    pub async fn list_with_tags(&self) -> Result<Vec<MachineListing>, DatabaseError> {
        self.fetch_listing(&[]).await
    }

    /// Case-insensitive substring match on the name. Empty matches everything.
    pub async fn search_by_name(&self, needle: &str) -> Result<Vec<MachineListing>, DatabaseError> {
        if needle.is_empty() {
            return self.list_with_tags().await;
        }
        self.fetch_listing(&[Predicate::NameContains(needle.to_string())])
            .await
    }

    /// Listing restricted by the composite filter selection.
    pub async fn query_by_filters(
        &self,
        filters: &MachineFilters,
    ) -> Result<Vec<MachineListing>, DatabaseError> {
        self.fetch_listing(&filters.predicates()).await
    }

    pub(crate) async fn fetch_listing(
        &self,
        predicates: &[Predicate],
    ) -> Result<Vec<MachineListing>, DatabaseError> {
        let mut qb = QueryBuilder::<Sqlite>::new(LISTING_SELECT);
        push_where(&mut qb, predicates);
        qb.push(LISTING_ORDER);

        let rows = qb
            .build_query_as::<MachineListingRow>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(MachineListing::from).collect())
    }

    /// Retired machines with no tags yet: the tag backfill worklist.
    pub async fn machines_missing_tags(&self) -> Result<Vec<i64>, DatabaseError> {
        let ids = sqlx::query_scalar(
            r"
            SELECT id FROM machines
            WHERE active = 0
              AND NOT EXISTS (SELECT 1 FROM machine_tag WHERE machine_tag.machine_id = machines.id)
            ORDER BY id
            ",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// Machines the account can play: all with VIP access, free ones otherwise.
    pub async fn machines_for_account(&self, elevated: bool) -> Result<Vec<NamedId>, DatabaseError> {
        let sql = if elevated {
            "SELECT name, id FROM machines ORDER BY name"
        } else {
            "SELECT name, id FROM machines WHERE free = 1 ORDER BY name"
        };
        let machines = sqlx::query_as::<_, NamedId>(sql)
            .fetch_all(self.pool())
            .await?;
        Ok(machines)
    }

    /// Distinct operating systems, for the filter options.
    pub async fn os_list(&self) -> Result<Vec<String>, DatabaseError> {
        let os = sqlx::query_scalar("SELECT DISTINCT os FROM machines ORDER BY os")
            .fetch_all(self.pool())
            .await?;
        Ok(os)
    }
}
