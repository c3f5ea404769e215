//! Database overview.
//!
//! Counts what the import and cleanup jobs have produced so an operator can
//! check a run landed: live persons and households, photos, households still
//! in the old location hierarchy, and the village mappings available to move
//! them. Used by `insurees stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub insurees: i64,
    pub archived_versions: i64,
    pub families: i64,
    pub photos: i64,
    /// Live households located below the cutover id.
    pub families_below_cutover: i64,
    pub village_mappings: i64,
    pub last_write_ts: Option<i64>,
}

pub async fn collect_stats(pool: &SqlitePool, first_new_location_id: i64) -> Result<StoreStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM insurees WHERE validity_to IS NULL) AS insurees,
            (SELECT COUNT(*) FROM insurees WHERE validity_to IS NOT NULL) AS archived_versions,
            (SELECT COUNT(*) FROM families WHERE validity_to IS NULL) AS families,
            (SELECT COUNT(*) FROM insuree_photos) AS photos,
            (SELECT COUNT(*) FROM families
                WHERE validity_to IS NULL AND location_id < ?) AS families_below_cutover,
            (SELECT COUNT(*) FROM hera_location_mappings
                WHERE is_instance_deleted = 0 AND location_type = 'V') AS village_mappings,
            (SELECT MAX(validity_from) FROM insurees) AS last_write_ts
        "#,
    )
    .bind(first_new_location_id)
    .fetch_one(pool)
    .await?;

    Ok(StoreStats {
        insurees: row.get("insurees"),
        archived_versions: row.get("archived_versions"),
        families: row.get("families"),
        photos: row.get("photos"),
        families_below_cutover: row.get("families_below_cutover"),
        village_mappings: row.get("village_mappings"),
        last_write_ts: row.get("last_write_ts"),
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool, config.repair.first_new_location_id).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Insuree Import: Database Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Last write:  {}", match stats.last_write_ts {
        Some(ts) => format_ts(ts),
        None => "never".to_string(),
    });
    println!();
    println!("  Insurees:    {} ({} archived versions)", stats.insurees, stats.archived_versions);
    println!("  Families:    {}", stats.families);
    println!("  Photos:      {}", stats.photos);
    println!(
        "  Old pyramid: {} families below location {}",
        stats.families_below_cutover, config.repair.first_new_location_id
    );
    println!("  Mappings:    {} villages", stats.village_mappings);
    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    match bytes as f64 {
        b if b < KB => format!("{} B", bytes),
        b if b < KB * KB => format!("{:.1} KB", b / KB),
        b => format!("{:.1} MB", b / (KB * KB)),
    }
}

/// Format a Unix timestamp as UTC minutes.
fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_counts_live_rows_and_cutover() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();

        for (id, name) in [(12, "Old village"), (5000, "New village")] {
            sqlx::query("INSERT INTO locations (id, code, name, type) VALUES (?, ?, ?, 'V')")
                .bind(id)
                .bind(format!("V{}", id))
                .bind(name)
                .execute(&pool)
                .await
                .unwrap();
        }
        for (uuid, location) in [("f1", 12), ("f2", 5000)] {
            sqlx::query(
                "INSERT INTO families (uuid, location_id, validity_from, audit_user_id) VALUES (?, ?, 0, 1)",
            )
            .bind(uuid)
            .bind(location)
            .execute(&pool)
            .await
            .unwrap();
        }
        sqlx::query(
            "INSERT INTO hera_location_mappings (hera_code, openimis_location_id, location_type, is_instance_deleted) \
             VALUES ('V1', 5000, 'V', 0), ('V2', 5000, 'V', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let stats = collect_stats(&pool, 4881).await.unwrap();
        assert_eq!(stats.families, 2);
        assert_eq!(stats.families_below_cutover, 1);
        assert_eq!(stats.village_mappings, 1);
        assert_eq!(stats.insurees, 0);
        assert_eq!(stats.last_write_ts, None);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_ts(1_700_000_000), "2023-11-14 22:13 UTC");
    }
}
