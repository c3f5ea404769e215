use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Administrative hierarchy: N(ation) > R (LGA) > D(istrict) > V(illage)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('N', 'R', 'D', 'V')),
            parent_id INTEGER REFERENCES locations(id),
            validity_to INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS families (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            head_insuree_id INTEGER,
            location_id INTEGER NOT NULL REFERENCES locations(id),
            validity_from INTEGER NOT NULL,
            validity_to INTEGER,
            audit_user_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insurees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            chf_id TEXT NOT NULL,
            family_id INTEGER REFERENCES families(id),
            photo_id INTEGER,
            last_name TEXT NOT NULL DEFAULT '',
            other_names TEXT NOT NULL DEFAULT '',
            dob TEXT,
            gender TEXT NOT NULL DEFAULT 'O',
            head INTEGER NOT NULL DEFAULT 0,
            phone TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            occupation TEXT NOT NULL DEFAULT '',
            father_name TEXT NOT NULL DEFAULT '',
            mother_name TEXT NOT NULL DEFAULT '',
            place_of_birth TEXT NOT NULL DEFAULT '',
            is_local INTEGER NOT NULL DEFAULT 0,
            certificate_number TEXT NOT NULL DEFAULT '',
            registration_date TEXT NOT NULL DEFAULT '',
            residential_alley TEXT NOT NULL DEFAULT '',
            residential_house_number TEXT NOT NULL DEFAULT '',
            residential_lga TEXT NOT NULL DEFAULT '',
            residential_district TEXT NOT NULL DEFAULT '',
            residential_village TEXT NOT NULL DEFAULT '',
            json_ext TEXT,
            validity_from INTEGER NOT NULL,
            validity_to INTEGER,
            legacy_id INTEGER,
            audit_user_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insuree_photos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            insuree_id INTEGER NOT NULL REFERENCES insurees(id),
            chf_id TEXT NOT NULL,
            folder TEXT NOT NULL,
            filename TEXT NOT NULL,
            officer_id INTEGER NOT NULL,
            photo_date TEXT NOT NULL,
            validity_from INTEGER NOT NULL,
            audit_user_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hera_location_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hera_code TEXT NOT NULL,
            openimis_location_id INTEGER NOT NULL,
            location_type TEXT NOT NULL,
            is_instance_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Only one live version per identity key
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_insurees_live_chf_id ON insurees(chf_id) WHERE validity_to IS NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_name ON locations(name, type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_locations_parent ON locations(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mappings_code ON hera_location_mappings(hera_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
