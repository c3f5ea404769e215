//! Storage abstraction for the importer.
//!
//! The [`Store`] trait is the only way the resolver, reconciler and the two
//! drivers touch persistent state. [`SqliteStore`](crate::sqlite_store::SqliteStore)
//! backs the CLI; [`memory::InMemoryStore`] backs unit tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ActiveHousehold, CreatedHousehold, Insuree, LocationNode, NewHousehold};

/// Abstract storage backend.
///
/// All name lookups are exact and case-sensitive, and only consider nodes
/// that are still current (no retirement timestamp).
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_village`](Store::find_village) | Village under a named district under a named LGA |
/// | [`find_lga`](Store::find_lga) | LGA by name |
/// | [`active_lgas`](Store::active_lgas) | All current LGAs (startup placeholder check) |
/// | [`get_location`](Store::get_location) | Location by id |
/// | [`find_insuree`](Store::find_insuree) | Live person by identity key |
/// | [`archive_and_save`](Store::archive_and_save) | Archive the live version and overwrite it, atomically |
/// | [`create_household`](Store::create_household) | Insert household, head and photo row, atomically |
/// | [`set_family_location`](Store::set_family_location) | Move a household |
/// | [`active_households_page`](Store::active_households_page) | Keyset page of live heads with their households |
/// | [`load_active_village_mappings`](Store::load_active_village_mappings) | External code → village id |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_village(
        &self,
        lga: &str,
        district: &str,
        village: &str,
    ) -> Result<Option<LocationNode>>;

    async fn find_lga(&self, name: &str) -> Result<Option<LocationNode>>;

    async fn active_lgas(&self) -> Result<Vec<LocationNode>>;

    async fn get_location(&self, id: i64) -> Result<Option<LocationNode>>;

    /// Live (not archived) person with this identity key.
    async fn find_insuree(&self, chf_id: &str) -> Result<Option<Insuree>>;

    /// Close `current` into an immutable history row at `archived_at` and
    /// overwrite the live row with `updated`. Both happen or neither does.
    async fn archive_and_save(
        &self,
        current: &Insuree,
        updated: &Insuree,
        archived_at: i64,
    ) -> Result<()>;

    /// Insert a household, its head and the head's photo row, linked to each
    /// other. Nothing is written when any part fails.
    async fn create_household(&self, new: &NewHousehold) -> Result<CreatedHousehold>;

    async fn set_family_location(&self, family_id: i64, location_id: i64) -> Result<()>;

    /// Up to `limit` live heads of household with `insuree_id > after_id`,
    /// ordered by insuree id.
    async fn active_households_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ActiveHousehold>>;

    /// Non-deleted village mappings as external code → location id.
    async fn load_active_village_mappings(&self) -> Result<HashMap<String, i64>>;
}
