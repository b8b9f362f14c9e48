//! Schema migrations.
//!
//! Scripts are embedded in the binary and applied in filename order. Applied
//! names are recorded in `_migrations`; a script's record is written only
//! after the script itself succeeds, so a crash mid-script leaves it eligible
//! for reattempt (at-least-once semantics — scripts are written to tolerate
//! reapplication). Running twice in a row applies nothing the second time.

use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::error::Result;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "V001__initial_schema.sql",
        include_str!("../migrations/V001__initial_schema.sql"),
    ),
    (
        "V002__queue_claim_index.sql",
        include_str!("../migrations/V002__queue_claim_index.sql"),
    ),
];

/// Apply all not-yet-applied migrations in order. Returns the names of the
/// scripts applied by this call.
pub async fn run_migrations(pool: &SqlitePool) -> Result<Vec<String>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: HashSet<String> = sqlx::query_as::<_, (String,)>("SELECT name FROM _migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(name,)| name)
        .collect();

    let mut newly_applied = Vec::new();

    for (name, sql) in MIGRATIONS {
        if applied.contains(*name) {
            tracing::debug!(name = *name, "skip (already applied)");
            continue;
        }

        tracing::info!(name = *name, "applying migration");
        sqlx::raw_sql(sql).execute(pool).await?;
        sqlx::query("INSERT INTO _migrations (name, applied_at) VALUES (?, ?)")
            .bind(*name)
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await?;
        newly_applied.push((*name).to_string());
    }

    Ok(newly_applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_by_name() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(n, _)| *n).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
