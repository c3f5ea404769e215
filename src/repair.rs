//! Household location cleanup.
//!
//! Moves households that still point into the old location hierarchy onto
//! the villages of the new one. The target village comes from the external
//! village code stored in the head's raw payload, translated through the
//! mapping table. Households whose code cannot be determined or translated
//! go to the unknown village.
//!
//! Heads of household are visited in id order with keyset pagination, so the
//! batch size only bounds memory and never changes the result.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RepairConfig};
use crate::db;
use crate::models::{ActiveHousehold, LocationNode};
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

const REGISTRATION_VILLAGE: &str = "registrationVillage";
const RESIDENTIAL_VILLAGE: &str = "residentialVillage";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairSummary {
    pub total: u64,
    pub updated: u64,
    /// Sent to the unknown village: no payload or no village code.
    pub skipped: u64,
    /// Sent to the unknown village: code has no mapping.
    pub unmapped: u64,
    /// Already in the new hierarchy, left alone.
    pub already_current: u64,
    /// Household write failed; location unchanged.
    pub failed: u64,
}

impl RepairSummary {
    pub fn is_clean(&self) -> bool {
        self.unmapped == 0 && self.failed == 0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "total: {}, updated: {}, skipped: {}, unmapped: {}, already current: {}, failed: {}",
            self.total, self.updated, self.skipped, self.unmapped, self.already_current, self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    AlreadyCurrent,
    NoPayload,
    MissingVillageCode,
    Unmapped(String),
    Mapped { code: String, location_id: i64 },
}

/// Village code carried by a payload: `residentialVillage` when non-empty,
/// else `registrationVillage`. `None` when the registration key is absent.
fn village_code(payload: &serde_json::Map<String, Value>) -> Option<String> {
    let registration = payload.get(REGISTRATION_VILLAGE)?;
    let residential = payload
        .get(RESIDENTIAL_VILLAGE)
        .map(value_text)
        .filter(|code| !code.is_empty());
    Some(residential.unwrap_or_else(|| value_text(registration)))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decide(
    household: &ActiveHousehold,
    mappings: &HashMap<String, i64>,
    first_new_location_id: i64,
) -> Decision {
    if household.family.location_id >= first_new_location_id {
        return Decision::AlreadyCurrent;
    }
    let payload = match &household.json_ext {
        Some(Value::Object(map)) if !map.is_empty() => map,
        Some(Value::Object(_)) | Some(Value::Null) | None => return Decision::NoPayload,
        Some(_) => return Decision::MissingVillageCode,
    };
    let Some(code) = village_code(payload) else {
        return Decision::MissingVillageCode;
    };
    match mappings.get(&code) {
        Some(&location_id) => Decision::Mapped { code, location_id },
        None => Decision::Unmapped(code),
    }
}

pub struct LocationRepair<'a> {
    store: &'a dyn Store,
    settings: &'a RepairConfig,
    dry_run: bool,
}

impl<'a> LocationRepair<'a> {
    pub fn new(store: &'a dyn Store, settings: &'a RepairConfig, dry_run: bool) -> Self {
        Self {
            store,
            settings,
            dry_run,
        }
    }

    pub async fn run(&self) -> Result<RepairSummary> {
        let unknown_village = self
            .store
            .get_location(self.settings.unknown_village_id)
            .await?
            .with_context(|| {
                format!(
                    "repair.unknown_village_id {} does not exist",
                    self.settings.unknown_village_id
                )
            })?;
        let mappings = self
            .store
            .load_active_village_mappings()
            .await
            .context("Failed to load village mappings")?;
        info!(mappings = mappings.len(), dry_run = self.dry_run, "cleaning household locations");

        let limit = self.settings.batch_size.max(1) as i64;
        let mut summary = RepairSummary::default();
        let mut after_id = 0;
        loop {
            let page = self.store.active_households_page(after_id, limit).await?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = last.insuree_id;
            for household in &page {
                self.repair_one(household, &mappings, &unknown_village, &mut summary)
                    .await;
            }
        }
        Ok(summary)
    }

    async fn repair_one(
        &self,
        household: &ActiveHousehold,
        mappings: &HashMap<String, i64>,
        unknown_village: &LocationNode,
        summary: &mut RepairSummary,
    ) {
        summary.total += 1;
        let chf_id = household.chf_id.as_str();
        let family_id = household.family.id;
        debug!(chf_id, family_id, location_id = household.family.location_id, "processing household");

        let decision = decide(household, mappings, self.settings.first_new_location_id);
        let target = match &decision {
            Decision::AlreadyCurrent => {
                summary.already_current += 1;
                return;
            }
            Decision::NoPayload => {
                warn!(chf_id, family_id, "no payload, sending to unknown village");
                summary.skipped += 1;
                unknown_village.id
            }
            Decision::MissingVillageCode => {
                warn!(chf_id, family_id, "no {} in payload, sending to unknown village", REGISTRATION_VILLAGE);
                summary.skipped += 1;
                unknown_village.id
            }
            Decision::Unmapped(code) => {
                error!(chf_id, family_id, code = %code, "no village mapping, sending to unknown village");
                summary.unmapped += 1;
                unknown_village.id
            }
            Decision::Mapped { code, location_id } => {
                debug!(chf_id, family_id, code = %code, location_id, "village mapped");
                summary.updated += 1;
                *location_id
            }
        };

        if self.dry_run {
            return;
        }
        if let Err(e) = self.store.set_family_location(family_id, target).await {
            error!(chf_id, family_id, location_id = target, "failed to move household: {:#}", e);
            match decision {
                Decision::Mapped { .. } => summary.updated -= 1,
                Decision::Unmapped(_) => summary.unmapped -= 1,
                _ => summary.skipped -= 1,
            }
            summary.failed += 1;
        }
    }
}

pub async fn run_clean_locations(config: &Config, dry_run: bool) -> Result<RepairSummary> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let summary = LocationRepair::new(&store, &config.repair, dry_run).run().await?;

    println!(
        "clean-locations{}",
        if dry_run { " (dry run, nothing written)" } else { "" }
    );
    println!("  {}", summary.summary_line());
    println!("{}", if summary.is_clean() { "ok" } else { "completed with errors" });

    store.pool().close().await;
    Ok(summary)
}
