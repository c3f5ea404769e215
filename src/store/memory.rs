//! In-memory [`Store`] implementation for testing.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock`. Lookups are linear
//! scans, which is fine for the handful of rows tests create.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ActiveHousehold, CreatedHousehold, Family, Insuree, InsureePhoto, LocationNode, LocationType,
    NewHousehold,
};

use super::Store;

struct StoredMapping {
    code: String,
    location_id: i64,
    location_type: String,
    deleted: bool,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    locations: RwLock<Vec<LocationNode>>,
    insurees: RwLock<BTreeMap<i64, Insuree>>,
    families: RwLock<BTreeMap<i64, Family>>,
    photos: RwLock<Vec<InsureePhoto>>,
    mappings: RwLock<Vec<StoredMapping>>,
    failing_chf_id: RwLock<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            locations: RwLock::new(Vec::new()),
            insurees: RwLock::new(BTreeMap::new()),
            families: RwLock::new(BTreeMap::new()),
            photos: RwLock::new(Vec::new()),
            mappings: RwLock::new(Vec::new()),
            failing_chf_id: RwLock::new(None),
        }
    }

    pub fn add_location(
        &self,
        id: i64,
        name: &str,
        kind: LocationType,
        parent_id: Option<i64>,
    ) -> LocationNode {
        let node = LocationNode {
            id,
            code: format!("{}{}", kind.code(), id),
            name: name.to_string(),
            kind,
            parent_id,
            validity_to: None,
        };
        self.locations.write().unwrap().push(node.clone());
        node
    }

    /// Mark a location as retired.
    pub fn retire_location(&self, id: i64, at: i64) {
        let mut locations = self.locations.write().unwrap();
        if let Some(node) = locations.iter_mut().find(|n| n.id == id) {
            node.validity_to = Some(at);
        }
    }

    pub fn add_mapping(&self, code: &str, location_id: i64, location_type: &str, deleted: bool) {
        self.mappings.write().unwrap().push(StoredMapping {
            code: code.to_string(),
            location_id,
            location_type: location_type.to_string(),
            deleted,
        });
    }

    /// Insert a live head of household directly, bypassing the import path.
    pub fn seed_household(
        &self,
        chf_id: &str,
        location_id: i64,
        json_ext: Option<serde_json::Value>,
    ) -> (Family, Insuree) {
        let mut families = self.families.write().unwrap();
        let mut insurees = self.insurees.write().unwrap();
        let family_id = next_id(&families);
        let insuree = Insuree {
            id: next_id(&insurees),
            uuid: Uuid::new_v4().to_string(),
            chf_id: chf_id.to_string(),
            family_id: Some(family_id),
            photo_id: None,
            details: crate::models::InsureeDetails {
                head: true,
                ..Default::default()
            },
            json_ext,
            validity_from: 0,
            validity_to: None,
            legacy_id: None,
            audit_user_id: 1,
        };
        let family = Family {
            id: family_id,
            uuid: Uuid::new_v4().to_string(),
            head_insuree_id: Some(insuree.id),
            location_id,
            validity_from: 0,
            validity_to: None,
            audit_user_id: 1,
        };
        families.insert(family.id, family.clone());
        insurees.insert(insuree.id, insuree.clone());
        (family, insuree)
    }

    /// Make every write for this identity key fail.
    pub fn fail_writes_for(&self, chf_id: &str) {
        *self.failing_chf_id.write().unwrap() = Some(chf_id.to_string());
    }

    /// Every person row, archived versions included, ordered by id.
    pub fn all_insurees(&self) -> Vec<Insuree> {
        self.insurees.read().unwrap().values().cloned().collect()
    }

    pub fn all_families(&self) -> Vec<Family> {
        self.families.read().unwrap().values().cloned().collect()
    }

    pub fn all_photos(&self) -> Vec<InsureePhoto> {
        self.photos.read().unwrap().clone()
    }

    fn check_writable(&self, chf_id: &str) -> Result<()> {
        if self.failing_chf_id.read().unwrap().as_deref() == Some(chf_id) {
            bail!("simulated write failure for {}", chf_id);
        }
        Ok(())
    }

    fn current(&self, id: Option<i64>, kind: LocationType, name: &str) -> Option<LocationNode> {
        let id = id?;
        self.locations
            .read()
            .unwrap()
            .iter()
            .find(|n| n.id == id && n.kind == kind && n.name == name && n.is_current())
            .cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
    map.keys().next_back().map(|id| id + 1).unwrap_or(1)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_village(
        &self,
        lga: &str,
        district: &str,
        village: &str,
    ) -> Result<Option<LocationNode>> {
        let villages: Vec<LocationNode> = self
            .locations
            .read()
            .unwrap()
            .iter()
            .filter(|n| n.kind == LocationType::Village && n.name == village && n.is_current())
            .cloned()
            .collect();
        for candidate in villages {
            let Some(d) = self.current(candidate.parent_id, LocationType::District, district)
            else {
                continue;
            };
            if self.current(d.parent_id, LocationType::Lga, lga).is_some() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn find_lga(&self, name: &str) -> Result<Option<LocationNode>> {
        Ok(self
            .locations
            .read()
            .unwrap()
            .iter()
            .find(|n| n.kind == LocationType::Lga && n.name == name && n.is_current())
            .cloned())
    }

    async fn active_lgas(&self) -> Result<Vec<LocationNode>> {
        Ok(self
            .locations
            .read()
            .unwrap()
            .iter()
            .filter(|n| n.kind == LocationType::Lga && n.is_current())
            .cloned()
            .collect())
    }

    async fn get_location(&self, id: i64) -> Result<Option<LocationNode>> {
        Ok(self
            .locations
            .read()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn find_insuree(&self, chf_id: &str) -> Result<Option<Insuree>> {
        Ok(self
            .insurees
            .read()
            .unwrap()
            .values()
            .find(|i| i.chf_id == chf_id && i.validity_to.is_none())
            .cloned())
    }

    async fn archive_and_save(
        &self,
        current: &Insuree,
        updated: &Insuree,
        archived_at: i64,
    ) -> Result<()> {
        self.check_writable(&current.chf_id)?;
        let mut insurees = self.insurees.write().unwrap();
        if !insurees.contains_key(&updated.id) {
            bail!("insuree {} does not exist", updated.id);
        }
        let id = next_id(&insurees);
        let mut history = current.clone();
        history.id = id;
        history.uuid = Uuid::new_v4().to_string();
        history.validity_to = Some(archived_at);
        history.legacy_id = Some(current.id);
        insurees.insert(id, history);
        insurees.insert(updated.id, updated.clone());
        Ok(())
    }

    async fn create_household(&self, new: &NewHousehold) -> Result<CreatedHousehold> {
        self.check_writable(&new.head.chf_id)?;
        let mut families = self.families.write().unwrap();
        let mut insurees = self.insurees.write().unwrap();
        let mut photos = self.photos.write().unwrap();
        if insurees
            .values()
            .any(|i| i.chf_id == new.head.chf_id && i.validity_to.is_none())
        {
            bail!("a live insuree with chf_id {} already exists", new.head.chf_id);
        }
        let now = chrono::Utc::now().timestamp();

        let family_id = next_id(&families);
        let insuree_id = next_id(&insurees);
        let photo = InsureePhoto {
            id: photos.len() as i64 + 1,
            uuid: Uuid::new_v4().to_string(),
            insuree_id,
            chf_id: new.photo.chf_id.clone(),
            folder: new.photo.folder.clone(),
            filename: new.photo.filename.clone(),
            officer_id: new.photo.officer_id,
            photo_date: new.photo.photo_date,
            audit_user_id: new.photo.audit_user_id,
        };
        let head = Insuree {
            id: insuree_id,
            uuid: Uuid::new_v4().to_string(),
            chf_id: new.head.chf_id.clone(),
            family_id: Some(family_id),
            photo_id: Some(photo.id),
            details: new.head.details.clone(),
            json_ext: Some(new.head.json_ext.clone()),
            validity_from: now,
            validity_to: None,
            legacy_id: None,
            audit_user_id: new.head.audit_user_id,
        };
        let family = Family {
            id: family_id,
            uuid: Uuid::new_v4().to_string(),
            head_insuree_id: Some(insuree_id),
            location_id: new.family.location_id,
            validity_from: now,
            validity_to: None,
            audit_user_id: new.family.audit_user_id,
        };

        families.insert(family.id, family.clone());
        insurees.insert(head.id, head.clone());
        photos.push(photo.clone());
        Ok(CreatedHousehold {
            family,
            head,
            photo,
        })
    }

    async fn set_family_location(&self, family_id: i64, location_id: i64) -> Result<()> {
        let head_chf_id = {
            let families = self.families.read().unwrap();
            let insurees = self.insurees.read().unwrap();
            families
                .get(&family_id)
                .and_then(|f| f.head_insuree_id)
                .and_then(|id| insurees.get(&id))
                .map(|i| i.chf_id.clone())
        };
        if let Some(chf_id) = head_chf_id {
            self.check_writable(&chf_id)?;
        }
        let mut families = self.families.write().unwrap();
        match families.get_mut(&family_id) {
            Some(family) => {
                family.location_id = location_id;
                Ok(())
            }
            None => bail!("family {} does not exist", family_id),
        }
    }

    async fn active_households_page(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ActiveHousehold>> {
        let insurees = self.insurees.read().unwrap();
        let families = self.families.read().unwrap();
        Ok(insurees
            .range(after_id + 1..)
            .map(|(_, i)| i)
            .filter(|i| i.validity_to.is_none() && i.details.head)
            .filter_map(|i| {
                let family = families.get(&i.family_id?)?;
                family.validity_to.is_none().then(|| ActiveHousehold {
                    insuree_id: i.id,
                    chf_id: i.chf_id.clone(),
                    json_ext: i.json_ext.clone(),
                    family: family.clone(),
                })
            })
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn load_active_village_mappings(&self) -> Result<HashMap<String, i64>> {
        Ok(self
            .mappings
            .read()
            .unwrap()
            .iter()
            .filter(|m| !m.deleted && m.location_type == "V")
            .map(|m| (m.code.clone(), m.location_id))
            .collect())
    }
}
