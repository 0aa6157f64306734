use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

const CURRENT_SCHEMA_VERSION: usize = MIGRATIONS.len();

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version")?;
    usize::try_from(version).with_context(|| format!("invalid user_version {version}"))
}

/// Bring the schema to the latest version in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let from = schema_version(conn)?;
    if from > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema v{from} is newer than this build supports (v{CURRENT_SCHEMA_VERSION})"
        );
    }
    if from == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction().context("failed to begin migration")?;
    for (name, sql) in &MIGRATIONS[from..] {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION as i64)
        .context("failed to update user_version")?;
    tx.commit().context("failed to commit migration")?;

    log::info!(target: "db", "schema migrated v{from} -> v{CURRENT_SCHEMA_VERSION}");
    Ok(())
}
