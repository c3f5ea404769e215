//! Import profiles.
//!
//! Registration exports arrive in more than one layout. A profile captures
//! everything that differs between them: delimiter, column names, whether the
//! identity number is checksum-validated, how existing persons are handled,
//! what happens to rows whose LGA is unknown, and the date-of-birth format.
//!
//! Two profiles are built in: `ecrvs` (comma separated, validated,
//! updates existing persons) and `legacy` (semicolon separated, no
//! validation, create-only). Profiles in the config file add to or replace
//! these by name.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

/// What to do when the identity key already exists.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    /// Archive the current version and apply the new fields.
    #[default]
    Update,
    /// Leave the existing person untouched; the row is counted as skipped.
    Skip,
}

/// What to do when not even the LGA of a row can be matched.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownRegionPolicy {
    /// Fail the row.
    #[default]
    Error,
    /// Send the household to the global unknown village.
    Fallback,
}

/// Layout of the `date_of_birth` column.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DobFormat {
    /// Already `YYYY-MM-DD`; taken as is.
    #[default]
    Iso,
    /// `DD/MM/YYYY`, reformatted to `YYYY-MM-DD`.
    Dmy,
}

impl DobFormat {
    pub fn parse(&self, value: &str) -> Option<NaiveDate> {
        let pattern = match self {
            DobFormat::Iso => "%Y-%m-%d",
            DobFormat::Dmy => "%d/%m/%Y",
        };
        NaiveDate::parse_from_str(value, pattern).ok()
    }
}

/// Header names for every column the normalizer reads.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Columns {
    pub nin: String,
    pub family_name: String,
    pub given_name: String,
    pub date_of_birth: String,
    pub sex: String,
    pub mobile_number: String,
    pub email: String,
    pub occupation: String,
    pub father_given_name: String,
    pub father_family_name: String,
    pub mother_given_name: String,
    pub mother_family_name: String,
    pub nationality: String,
    pub country_of_birth: String,
    pub birth_city: String,
    pub health_facility: String,
    pub registration_lga: String,
    pub registration_district: String,
    pub registration_village: String,
    pub residential_lga: String,
    pub residential_district: String,
    pub residential_village: String,
    pub residential_alley: String,
    pub residential_house_number: String,
    pub certificate_number: String,
    pub registration_date: String,
    pub photo: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            nin: "nin".to_string(),
            family_name: "familyName".to_string(),
            given_name: "givenName".to_string(),
            date_of_birth: "dateOfBirth".to_string(),
            sex: "sex".to_string(),
            mobile_number: "mobileNumber".to_string(),
            email: "email".to_string(),
            occupation: "occupation".to_string(),
            father_given_name: "fatherGivenName".to_string(),
            father_family_name: "fatherFamilyName".to_string(),
            mother_given_name: "motherGivenName".to_string(),
            mother_family_name: "motherFamilyName".to_string(),
            nationality: "nationality".to_string(),
            country_of_birth: "countryOfBirth".to_string(),
            birth_city: "birthCity".to_string(),
            health_facility: "healthFacility".to_string(),
            registration_lga: "registrationLga".to_string(),
            registration_district: "registrationDistrict".to_string(),
            registration_village: "registrationVillage".to_string(),
            residential_lga: "residentialLga".to_string(),
            residential_district: "residentialDistrict".to_string(),
            residential_village: "residentialVillage".to_string(),
            residential_alley: "residentialAlley".to_string(),
            residential_house_number: "residentialHouseNumber".to_string(),
            certificate_number: "certificateNumber".to_string(),
            registration_date: "registrationDate".to_string(),
            photo: "photo".to_string(),
        }
    }
}

impl Columns {
    /// Column names of the semicolon-separated exports from the first
    /// registration campaign.
    pub fn legacy() -> Self {
        Self {
            nin: "nin".to_string(),
            family_name: "family_name".to_string(),
            given_name: "given_name".to_string(),
            date_of_birth: "date_of_birth".to_string(),
            sex: "sex".to_string(),
            mobile_number: "mobile_number".to_string(),
            email: "email".to_string(),
            occupation: "occupation".to_string(),
            father_given_name: "father_name".to_string(),
            father_family_name: "father_lastname".to_string(),
            mother_given_name: "mother_name".to_string(),
            mother_family_name: "mother_lastname".to_string(),
            nationality: "nationality".to_string(),
            country_of_birth: "country".to_string(),
            birth_city: "city".to_string(),
            health_facility: "health_facility".to_string(),
            registration_lga: "national_subdivision".to_string(),
            registration_district: "district".to_string(),
            registration_village: "city".to_string(),
            residential_lga: "residential_lga".to_string(),
            residential_district: "residential_district".to_string(),
            residential_village: "residential_village".to_string(),
            residential_alley: "residential_alley".to_string(),
            residential_house_number: "residential_house_number".to_string(),
            certificate_number: "certificate_number".to_string(),
            registration_date: "registration_date".to_string(),
            photo: "photo".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ImportProfile {
    pub delimiter: char,
    pub validate_nin: bool,
    pub existing: ExistingPolicy,
    pub unknown_region: UnknownRegionPolicy,
    pub dob_format: DobFormat,
    pub columns: Columns,
}

impl Default for ImportProfile {
    fn default() -> Self {
        Self {
            delimiter: ',',
            validate_nin: true,
            existing: ExistingPolicy::Update,
            unknown_region: UnknownRegionPolicy::Error,
            dob_format: DobFormat::Iso,
            columns: Columns::default(),
        }
    }
}

impl ImportProfile {
    pub fn legacy() -> Self {
        Self {
            delimiter: ';',
            validate_nin: false,
            existing: ExistingPolicy::Skip,
            unknown_region: UnknownRegionPolicy::Fallback,
            dob_format: DobFormat::Dmy,
            columns: Columns::legacy(),
        }
    }

    /// Delimiter as the single byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Option<u8> {
        if self.delimiter.is_ascii() {
            Some(self.delimiter as u8)
        } else {
            None
        }
    }
}

/// Built-in profiles, keyed by name.
pub fn builtin_profiles() -> BTreeMap<String, ImportProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert("ecrvs".to_string(), ImportProfile::default());
    profiles.insert("legacy".to_string(), ImportProfile::legacy());
    profiles
}
