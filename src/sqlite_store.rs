//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`migrate::create_schema`](crate::migrate::create_schema). Dates are kept
//! as `YYYY-MM-DD` text, timestamps as Unix seconds, and the raw input row
//! as JSON text.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{
    ActiveHousehold, CreatedHousehold, Family, Gender, Insuree, InsureeDetails, InsureePhoto,
    LocationNode, LocationType, NewHousehold,
};
use crate::store::Store;

const DATE_FORMAT: &str = "%Y-%m-%d";

const INSUREE_COLUMNS: &str = "id, uuid, chf_id, family_id, photo_id, last_name, other_names, \
    dob, gender, head, phone, email, occupation, father_name, mother_name, place_of_birth, \
    is_local, certificate_number, registration_date, residential_alley, \
    residential_house_number, residential_lga, residential_district, residential_village, \
    json_ext, validity_from, validity_to, legacy_id, audit_user_id";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn location_from_row(row: &SqliteRow) -> Result<LocationNode> {
    let kind: String = row.try_get("type")?;
    Ok(LocationNode {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        kind: LocationType::from_code(&kind)
            .with_context(|| format!("unknown location type '{}'", kind))?,
        parent_id: row.try_get("parent_id")?,
        validity_to: row.try_get("validity_to")?,
    })
}

fn family_from_row(row: &SqliteRow) -> Result<Family> {
    Ok(Family {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        head_insuree_id: row.try_get("head_insuree_id")?,
        location_id: row.try_get("location_id")?,
        validity_from: row.try_get("validity_from")?,
        validity_to: row.try_get("validity_to")?,
        audit_user_id: row.try_get("audit_user_id")?,
    })
}

fn parse_json_ext(text: Option<String>) -> Result<Option<serde_json::Value>> {
    match text {
        Some(t) if !t.is_empty() => Ok(Some(
            serde_json::from_str(&t).context("insurees.json_ext is not valid JSON")?,
        )),
        _ => Ok(None),
    }
}

fn insuree_from_row(row: &SqliteRow) -> Result<Insuree> {
    let dob: Option<String> = row.try_get("dob")?;
    let gender: String = row.try_get("gender")?;
    let details = InsureeDetails {
        last_name: row.try_get("last_name")?,
        other_names: row.try_get("other_names")?,
        dob: dob.and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
        gender: Gender::from_code(&gender),
        head: row.try_get("head")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        occupation: row.try_get("occupation")?,
        father_name: row.try_get("father_name")?,
        mother_name: row.try_get("mother_name")?,
        place_of_birth: row.try_get("place_of_birth")?,
        is_local: row.try_get("is_local")?,
        certificate_number: row.try_get("certificate_number")?,
        registration_date: row.try_get("registration_date")?,
        residential_alley: row.try_get("residential_alley")?,
        residential_house_number: row.try_get("residential_house_number")?,
        residential_lga: row.try_get("residential_lga")?,
        residential_district: row.try_get("residential_district")?,
        residential_village: row.try_get("residential_village")?,
    };
    Ok(Insuree {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        chf_id: row.try_get("chf_id")?,
        family_id: row.try_get("family_id")?,
        photo_id: row.try_get("photo_id")?,
        details,
        json_ext: parse_json_ext(row.try_get("json_ext")?)?,
        validity_from: row.try_get("validity_from")?,
        validity_to: row.try_get("validity_to")?,
        legacy_id: row.try_get("legacy_id")?,
        audit_user_id: row.try_get("audit_user_id")?,
    })
}

fn format_dob(dob: Option<NaiveDate>) -> Option<String> {
    dob.map(|d| d.format(DATE_FORMAT).to_string())
}

/// Insert one full person row and return its id.
async fn insert_insuree_row(conn: &mut SqliteConnection, insuree: &Insuree) -> Result<i64> {
    let d = &insuree.details;
    let json_ext = insuree
        .json_ext
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let result = sqlx::query(
        r#"
        INSERT INTO insurees (uuid, chf_id, family_id, photo_id, last_name, other_names,
                              dob, gender, head, phone, email, occupation, father_name,
                              mother_name, place_of_birth, is_local, certificate_number,
                              registration_date, residential_alley, residential_house_number,
                              residential_lga, residential_district, residential_village,
                              json_ext, validity_from, validity_to, legacy_id, audit_user_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&insuree.uuid)
    .bind(&insuree.chf_id)
    .bind(insuree.family_id)
    .bind(insuree.photo_id)
    .bind(&d.last_name)
    .bind(&d.other_names)
    .bind(format_dob(d.dob))
    .bind(d.gender.code())
    .bind(d.head)
    .bind(&d.phone)
    .bind(&d.email)
    .bind(&d.occupation)
    .bind(&d.father_name)
    .bind(&d.mother_name)
    .bind(&d.place_of_birth)
    .bind(d.is_local)
    .bind(&d.certificate_number)
    .bind(&d.registration_date)
    .bind(&d.residential_alley)
    .bind(&d.residential_house_number)
    .bind(&d.residential_lga)
    .bind(&d.residential_district)
    .bind(&d.residential_village)
    .bind(json_ext)
    .bind(insuree.validity_from)
    .bind(insuree.validity_to)
    .bind(insuree.legacy_id)
    .bind(insuree.audit_user_id)
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_village(
        &self,
        lga: &str,
        district: &str,
        village: &str,
    ) -> Result<Option<LocationNode>> {
        let row = sqlx::query(
            r#"
            SELECT v.id, v.code, v.name, v.type, v.parent_id, v.validity_to
            FROM locations v
            JOIN locations d ON d.id = v.parent_id
            JOIN locations l ON l.id = d.parent_id
            WHERE v.type = 'V' AND v.name = ? AND v.validity_to IS NULL
              AND d.type = 'D' AND d.name = ? AND d.validity_to IS NULL
              AND l.type = 'R' AND l.name = ? AND l.validity_to IS NULL
            ORDER BY v.id
            LIMIT 1
            "#,
        )
        .bind(village)
        .bind(district)
        .bind(lga)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn find_lga(&self, name: &str) -> Result<Option<LocationNode>> {
        let row = sqlx::query(
            "SELECT id, code, name, type, parent_id, validity_to FROM locations \
             WHERE type = 'R' AND name = ? AND validity_to IS NULL ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn active_lgas(&self) -> Result<Vec<LocationNode>> {
        let rows = sqlx::query(
            "SELECT id, code, name, type, parent_id, validity_to FROM locations \
             WHERE type = 'R' AND validity_to IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(location_from_row).collect()
    }

    async fn get_location(&self, id: i64) -> Result<Option<LocationNode>> {
        let row = sqlx::query(
            "SELECT id, code, name, type, parent_id, validity_to FROM locations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(location_from_row).transpose()
    }

    async fn find_insuree(&self, chf_id: &str) -> Result<Option<Insuree>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM insurees WHERE chf_id = ? AND validity_to IS NULL",
            INSUREE_COLUMNS
        ))
        .bind(chf_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(insuree_from_row).transpose()
    }

    async fn archive_and_save(
        &self,
        current: &Insuree,
        updated: &Insuree,
        archived_at: i64,
    ) -> Result<()> {
        let mut history = current.clone();
        history.uuid = Uuid::new_v4().to_string();
        history.validity_to = Some(archived_at);
        history.legacy_id = Some(current.id);

        let mut tx = self.pool.begin().await?;
        insert_insuree_row(&mut tx, &history).await?;

        let d = &updated.details;
        let json_ext = updated
            .json_ext
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE insurees SET
                last_name = ?, other_names = ?, dob = ?, gender = ?, head = ?, phone = ?,
                email = ?, occupation = ?, father_name = ?, mother_name = ?,
                place_of_birth = ?, is_local = ?, certificate_number = ?,
                registration_date = ?, residential_alley = ?, residential_house_number = ?,
                residential_lga = ?, residential_district = ?, residential_village = ?,
                json_ext = ?, validity_from = ?, audit_user_id = ?
            WHERE id = ? AND validity_to IS NULL
            "#,
        )
        .bind(&d.last_name)
        .bind(&d.other_names)
        .bind(format_dob(d.dob))
        .bind(d.gender.code())
        .bind(d.head)
        .bind(&d.phone)
        .bind(&d.email)
        .bind(&d.occupation)
        .bind(&d.father_name)
        .bind(&d.mother_name)
        .bind(&d.place_of_birth)
        .bind(d.is_local)
        .bind(&d.certificate_number)
        .bind(&d.registration_date)
        .bind(&d.residential_alley)
        .bind(&d.residential_house_number)
        .bind(&d.residential_lga)
        .bind(&d.residential_district)
        .bind(&d.residential_village)
        .bind(json_ext)
        .bind(updated.validity_from)
        .bind(updated.audit_user_id)
        .bind(updated.id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the history row.
            bail!("live insuree {} does not exist", updated.id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_household(&self, new: &NewHousehold) -> Result<CreatedHousehold> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let mut family = Family {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            head_insuree_id: None,
            location_id: new.family.location_id,
            validity_from: now,
            validity_to: None,
            audit_user_id: new.family.audit_user_id,
        };
        family.id = sqlx::query(
            "INSERT INTO families (uuid, location_id, validity_from, audit_user_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&family.uuid)
        .bind(family.location_id)
        .bind(family.validity_from)
        .bind(family.audit_user_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut head = Insuree {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            chf_id: new.head.chf_id.clone(),
            family_id: Some(family.id),
            photo_id: None,
            details: new.head.details.clone(),
            json_ext: Some(new.head.json_ext.clone()),
            validity_from: now,
            validity_to: None,
            legacy_id: None,
            audit_user_id: new.head.audit_user_id,
        };
        head.id = insert_insuree_row(&mut tx, &head).await?;

        let mut photo = InsureePhoto {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            insuree_id: head.id,
            chf_id: new.photo.chf_id.clone(),
            folder: new.photo.folder.clone(),
            filename: new.photo.filename.clone(),
            officer_id: new.photo.officer_id,
            photo_date: new.photo.photo_date,
            audit_user_id: new.photo.audit_user_id,
        };
        photo.id = sqlx::query(
            r#"
            INSERT INTO insuree_photos (uuid, insuree_id, chf_id, folder, filename, officer_id,
                                        photo_date, validity_from, audit_user_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&photo.uuid)
        .bind(photo.insuree_id)
        .bind(&photo.chf_id)
        .bind(&photo.folder)
        .bind(&photo.filename)
        .bind(photo.officer_id)
        .bind(photo.photo_date.format(DATE_FORMAT).to_string())
        .bind(now)
        .bind(photo.audit_user_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE insurees SET photo_id = ? WHERE id = ?")
            .bind(photo.id)
            .bind(head.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE families SET head_insuree_id = ? WHERE id = ?")
            .bind(head.id)
            .bind(family.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        head.photo_id = Some(photo.id);
        family.head_insuree_id = Some(head.id);
        Ok(CreatedHousehold {
            family,
            head,
            photo,
        })
    }

    async fn set_family_location(&self, family_id: i64, location_id: i64) -> Result<()> {
        sqlx::query("UPDATE families SET location_id = ? WHERE id = ?")
            .bind(location_id)
            .bind(family_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_households_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ActiveHousehold>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS insuree_id, i.chf_id, i.json_ext,
                   f.id, f.uuid, f.head_insuree_id, f.location_id,
                   f.validity_from, f.validity_to, f.audit_user_id
            FROM insurees i
            JOIN families f ON f.id = i.family_id
            WHERE i.validity_to IS NULL AND i.head = 1 AND f.validity_to IS NULL
              AND i.id > ?
            ORDER BY i.id
            LIMIT ?
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ActiveHousehold> {
                Ok(ActiveHousehold {
                    insuree_id: row.try_get("insuree_id")?,
                    chf_id: row.try_get("chf_id")?,
                    json_ext: parse_json_ext(row.try_get("json_ext")?)?,
                    family: family_from_row(row)?,
                })
            })
            .collect()
    }

    async fn load_active_village_mappings(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT hera_code, openimis_location_id FROM hera_location_mappings \
             WHERE is_instance_deleted = 0 AND location_type = 'V' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut mappings = HashMap::with_capacity(rows.len());
        for row in &rows {
            mappings.insert(
                row.try_get::<String, _>("hera_code")?,
                row.try_get::<i64, _>("openimis_location_id")?,
            );
        }
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use crate::models::{NewFamily, NewInsuree, NewPhoto};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        for (id, name, kind, parent) in [
            (1, "The Gambia", "N", None),
            (10, "Banjul", "R", Some(1)),
            (100, "Banjul Central", "D", Some(10)),
            (1000, "Half Die", "V", Some(100)),
            (4873, "Unknown village", "V", Some(100)),
        ] {
            sqlx::query(
                "INSERT INTO locations (id, code, name, type, parent_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(format!("{}{}", kind, id))
            .bind(name)
            .bind(kind)
            .bind(parent)
            .execute(&pool)
            .await
            .unwrap();
        }
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_find_village_is_exact() {
        let store = memory_store().await;
        let found = store
            .find_village("Banjul", "Banjul Central", "Half Die")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 1000);
        assert_eq!(found.kind, LocationType::Village);
        assert!(store
            .find_village("Banjul", "Banjul Central", "HALF DIE")
            .await
            .unwrap()
            .is_none());
        assert!(store.find_lga("banjul").await.unwrap().is_none());
        assert_eq!(store.find_lga("Banjul").await.unwrap().unwrap().id, 10);
    }

    #[tokio::test]
    async fn test_retired_district_hides_village() {
        let store = memory_store().await;
        sqlx::query("UPDATE locations SET validity_to = 1 WHERE id = 100")
            .execute(store.pool())
            .await
            .unwrap();
        assert!(store
            .find_village("Banjul", "Banjul Central", "Half Die")
            .await
            .unwrap()
            .is_none());
    }

    fn household(chf_id: &str) -> NewHousehold {
        NewHousehold {
            family: NewFamily {
                location_id: 1000,
                audit_user_id: 1,
            },
            head: NewInsuree {
                chf_id: chf_id.to_string(),
                details: InsureeDetails {
                    last_name: "Jallow".to_string(),
                    dob: NaiveDate::from_ymd_opt(1990, 3, 14),
                    gender: Gender::Female,
                    head: true,
                    is_local: true,
                    ..Default::default()
                },
                json_ext: serde_json::json!({"registrationVillage": "V1"}),
                audit_user_id: 1,
            },
            photo: NewPhoto {
                chf_id: chf_id.to_string(),
                folder: "1990/03".to_string(),
                filename: format!("{}_a.jpg", chf_id),
                photo_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                officer_id: 3,
                audit_user_id: 1,
            },
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insuree_round_trip_and_archive() {
        let store = memory_store().await;
        let created = store.create_household(&household("123456789015")).await.unwrap();
        assert_eq!(created.family.head_insuree_id, Some(created.head.id));
        assert_eq!(created.head.family_id, Some(created.family.id));
        assert_eq!(created.head.photo_id, Some(created.photo.id));
        assert_eq!(created.photo.insuree_id, created.head.id);

        let loaded = store.find_insuree("123456789015").await.unwrap().unwrap();
        assert_eq!(loaded, created.head);

        let mut live = loaded.clone();
        live.details.last_name = "Ceesay".to_string();
        store.archive_and_save(&loaded, &live, 42).await.unwrap();

        let reloaded = store.find_insuree("123456789015").await.unwrap().unwrap();
        assert_eq!(reloaded.id, created.head.id);
        assert_eq!(reloaded.details.last_name, "Ceesay");

        let history: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM insurees WHERE legacy_id = ? AND validity_to = 42 AND last_name = 'Jallow'",
        )
        .bind(created.head.id)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(history, 1);

        let page = store.active_households_page(0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].family.location_id, 1000);
        assert_eq!(
            page[0].json_ext.as_ref().unwrap()["registrationVillage"],
            "V1"
        );
    }

    #[tokio::test]
    async fn test_failed_household_insert_rolls_back() {
        let store = memory_store().await;
        store.create_household(&household("123456789015")).await.unwrap();

        // The family row goes in before the second live person with the
        // same identity hits the unique index.
        assert!(store.create_household(&household("123456789015")).await.is_err());

        assert_eq!(count(&store, "families").await, 1);
        assert_eq!(count(&store, "insurees").await, 1);
        assert_eq!(count(&store, "insuree_photos").await, 1);
    }

    #[tokio::test]
    async fn test_save_of_missing_person_keeps_no_history() {
        let store = memory_store().await;
        let created = store.create_household(&household("123456789015")).await.unwrap();
        let mut ghost = created.head.clone();
        ghost.id = 999;

        assert!(store.archive_and_save(&created.head, &ghost, 42).await.is_err());
        assert_eq!(count(&store, "insurees").await, 1);
    }

    #[tokio::test]
    async fn test_mappings_filter_deleted_and_non_village() {
        let store = memory_store().await;
        for (code, id, kind, deleted) in [
            ("V1", 1000, "V", 0),
            ("V2", 4873, "V", 1),
            ("D1", 100, "D", 0),
        ] {
            sqlx::query(
                "INSERT INTO hera_location_mappings (hera_code, openimis_location_id, location_type, is_instance_deleted) VALUES (?, ?, ?, ?)",
            )
            .bind(code)
            .bind(id)
            .bind(kind)
            .bind(deleted)
            .execute(store.pool())
            .await
            .unwrap();
        }
        let mappings = store.load_active_village_mappings().await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings["V1"], 1000);
    }
}
