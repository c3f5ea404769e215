//! Location resolution.
//!
//! Maps the free-text LGA / district / village names of a row onto the
//! administrative hierarchy (nation > LGA > district > village).
//!
//! 1. Pick the residence triple when all three names are present, otherwise
//!    the registration-place triple.
//! 2. Look for a current village with that exact name whose parent is a
//!    current district and whose grandparent is a current LGA, both with
//!    exactly matching names. Matching is case-sensitive.
//! 3. On a miss, look the LGA up alone and use its "unknown village"
//!    placeholder from [`UnknownVillageMap`].
//! 4. When the LGA itself is unknown the row fails with
//!    [`RowError::UnknownRegion`], unless the profile asks for the global
//!    unknown village instead.

use std::collections::HashMap;

use crate::error::RowError;
use crate::models::{LocationCandidates, LocationNode, LocationTriple};
use crate::profile::UnknownRegionPolicy;
use crate::store::Store;

/// LGA location id → placeholder village id.
///
/// Built once from configuration before the first row and read-only after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownVillageMap {
    by_lga: HashMap<i64, i64>,
}

impl UnknownVillageMap {
    pub fn new(by_lga: HashMap<i64, i64>) -> Self {
        Self { by_lga }
    }

    pub fn placeholder_for(&self, lga_id: i64) -> Option<i64> {
        self.by_lga.get(&lga_id).copied()
    }

    /// LGAs among `lgas` that have no placeholder.
    pub fn missing<'a>(&self, lgas: &'a [LocationNode]) -> Vec<&'a LocationNode> {
        lgas.iter()
            .filter(|lga| !self.by_lga.contains_key(&lga.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_lga.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_lga.is_empty()
    }
}

/// Where a row's household ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The exact village named in the row.
    Village(LocationNode),
    /// The LGA was recognised but the district/village pair was not.
    LgaPlaceholder { lga: LocationNode, village_id: i64 },
    /// Nothing matched; the profile sends such rows to the global placeholder.
    GlobalPlaceholder { village_id: i64 },
}

impl Resolution {
    pub fn location_id(&self) -> i64 {
        match self {
            Resolution::Village(node) => node.id,
            Resolution::LgaPlaceholder { village_id, .. } => *village_id,
            Resolution::GlobalPlaceholder { village_id } => *village_id,
        }
    }

    /// True for the soft-fallback outcomes.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Resolution::Village(_))
    }
}

/// The triple resolution should use for this row.
pub fn choose_triple(candidates: &LocationCandidates) -> &LocationTriple {
    if candidates.residence.is_complete() {
        &candidates.residence
    } else {
        &candidates.registration
    }
}

pub struct LocationResolver<'a> {
    store: &'a dyn Store,
    unknown_villages: &'a UnknownVillageMap,
    unknown_region: UnknownRegionPolicy,
    global_unknown_village_id: i64,
}

impl<'a> LocationResolver<'a> {
    pub fn new(
        store: &'a dyn Store,
        unknown_villages: &'a UnknownVillageMap,
        unknown_region: UnknownRegionPolicy,
        global_unknown_village_id: i64,
    ) -> Self {
        Self {
            store,
            unknown_villages,
            unknown_region,
            global_unknown_village_id,
        }
    }

    pub async fn resolve(&self, candidates: &LocationCandidates) -> Result<Resolution, RowError> {
        let triple = choose_triple(candidates);
        if let Some(village) = self
            .store
            .find_village(&triple.lga, &triple.district, &triple.village)
            .await
            .map_err(RowError::Persistence)?
        {
            return Ok(Resolution::Village(village));
        }

        let lga = self
            .store
            .find_lga(&triple.lga)
            .await
            .map_err(RowError::Persistence)?;
        let Some(lga) = lga else {
            return match self.unknown_region {
                UnknownRegionPolicy::Error => Err(RowError::UnknownRegion(triple.lga.clone())),
                UnknownRegionPolicy::Fallback => Ok(Resolution::GlobalPlaceholder {
                    village_id: self.global_unknown_village_id,
                }),
            };
        };

        match self.unknown_villages.placeholder_for(lga.id) {
            Some(village_id) => Ok(Resolution::LgaPlaceholder { lga, village_id }),
            None => Err(RowError::MissingPlaceholder {
                lga: lga.name.clone(),
                lga_id: lga.id,
            }),
        }
    }
}
