//! Core data models used throughout the importer.
//!
//! These types represent the raw rows read from registration exports, the
//! normalized records derived from them, the administrative location
//! hierarchy, and the persisted person / household / photo entities.

use std::collections::BTreeMap;

use chrono::NaiveDate;

/// One input row as read from the export: header name → trimmed value.
///
/// Ephemeral; produced by the CSV reader and consumed once by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field. Keys and values are stored trimmed.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    /// Value of a column, or `""` when the column is absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The full row as a JSON object, kept on the person for audit.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k.as_ref(), v.as_ref());
        }
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gender {
    Female,
    Male,
    #[default]
    Other,
}

impl Gender {
    /// Map the export's `sex` column to a gender.
    pub fn from_sex(sex: &str) -> Self {
        match sex {
            "FEMALE" => Gender::Female,
            "MALE" => Gender::Male,
            _ => Gender::Other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Gender::Female => "F",
            Gender::Male => "M",
            Gender::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "F" => Gender::Female,
            "M" => Gender::Male,
            _ => Gender::Other,
        }
    }
}

/// Free-text names for one administrative location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationTriple {
    pub lga: String,
    pub district: String,
    pub village: String,
}

impl LocationTriple {
    pub fn new(lga: &str, district: &str, village: &str) -> Self {
        Self {
            lga: lga.to_string(),
            district: district.to_string(),
            village: village.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.lga.is_empty() && !self.district.is_empty() && !self.village.is_empty()
    }
}

/// The two location descriptions a registration row may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationCandidates {
    pub residence: LocationTriple,
    pub registration: LocationTriple,
}

/// Person fields that are written on create and overwritten on update.
///
/// Household location and photo are intentionally absent: they are set once
/// when a person is created and never touched by a later update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsureeDetails {
    pub last_name: String,
    pub other_names: String,
    pub dob: Option<NaiveDate>,
    pub gender: Gender,
    pub head: bool,
    pub phone: String,
    pub email: String,
    pub occupation: String,
    pub father_name: String,
    pub mother_name: String,
    pub place_of_birth: String,
    pub is_local: bool,
    pub certificate_number: String,
    pub registration_date: String,
    pub residential_alley: String,
    pub residential_house_number: String,
    pub residential_lga: String,
    pub residential_district: String,
    pub residential_village: String,
}

/// Canonical form of one input row.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Identity key (chf id / NIN).
    pub chf_id: String,
    pub details: InsureeDetails,
    pub locations: LocationCandidates,
    /// Base64 photo payload, if the row carried one.
    pub photo: Option<String>,
    /// Original `date_of_birth` text, kept for diagnostics when parsing fails.
    pub dob_text: String,
    /// The whole trimmed input row.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationType {
    Nation,
    Lga,
    District,
    Village,
}

impl LocationType {
    pub fn code(&self) -> &'static str {
        match self {
            LocationType::Nation => "N",
            LocationType::Lga => "R",
            LocationType::District => "D",
            LocationType::Village => "V",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "N" => Some(LocationType::Nation),
            "R" => Some(LocationType::Lga),
            "D" => Some(LocationType::District),
            "V" => Some(LocationType::Village),
            _ => None,
        }
    }
}

/// One node of the nation > LGA > district > village hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNode {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub kind: LocationType,
    /// Parent node id; used for traversal only.
    pub parent_id: Option<i64>,
    /// Retirement timestamp. A node is current while this is unset.
    pub validity_to: Option<i64>,
}

impl LocationNode {
    pub fn is_current(&self) -> bool {
        self.validity_to.is_none()
    }
}

/// A household.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    pub id: i64,
    pub uuid: String,
    pub head_insuree_id: Option<i64>,
    pub location_id: i64,
    pub validity_from: i64,
    pub validity_to: Option<i64>,
    pub audit_user_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewFamily {
    pub location_id: i64,
    pub audit_user_id: i64,
}

/// A person row. Live rows have `validity_to` unset; archived versions point
/// at the live row through `legacy_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insuree {
    pub id: i64,
    pub uuid: String,
    pub chf_id: String,
    pub family_id: Option<i64>,
    pub photo_id: Option<i64>,
    pub details: InsureeDetails,
    pub json_ext: Option<serde_json::Value>,
    pub validity_from: i64,
    pub validity_to: Option<i64>,
    pub legacy_id: Option<i64>,
    pub audit_user_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewInsuree {
    pub chf_id: String,
    pub details: InsureeDetails,
    pub json_ext: serde_json::Value,
    pub audit_user_id: i64,
}

/// Photo metadata attached to a person at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsureePhoto {
    pub id: i64,
    pub uuid: String,
    pub insuree_id: i64,
    pub chf_id: String,
    pub folder: String,
    pub filename: String,
    pub officer_id: i64,
    pub photo_date: NaiveDate,
    pub audit_user_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub chf_id: String,
    pub folder: String,
    pub filename: String,
    pub photo_date: NaiveDate,
    pub officer_id: i64,
    pub audit_user_id: i64,
}

/// Everything written when a new person is imported: the household, the
/// person heading it and the person's photo row.
#[derive(Debug, Clone)]
pub struct NewHousehold {
    pub family: NewFamily,
    pub head: NewInsuree,
    pub photo: NewPhoto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedHousehold {
    pub family: Family,
    pub head: Insuree,
    pub photo: InsureePhoto,
}

/// Head of household plus the household it owns, as seen by the repair job.
#[derive(Debug, Clone)]
pub struct ActiveHousehold {
    pub insuree_id: i64,
    pub chf_id: String,
    pub json_ext: Option<serde_json::Value>,
    pub family: Family,
}
