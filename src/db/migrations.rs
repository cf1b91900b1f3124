use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` moves `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

pub fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version = schema_version(conn)?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "click database is at schema {version}, newer than supported schema {CURRENT_SCHEMA_VERSION}"
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    for (name, script) in &MIGRATIONS[version.max(0) as usize..] {
        tx.execute_batch(script)
            .with_context(|| format!("failed to execute {name}"))?;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}
