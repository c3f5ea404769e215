//! Import pipeline orchestration.
//!
//! Reads a delimited export row by row and drives each row through
//! normalize → validate → resolve location → reconcile. A failing row is
//! logged, counted and skipped; it never stops the rows after it. Only
//! startup problems (unreadable file, database, incomplete placeholder
//! configuration) abort the run.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::checksum::{has_valid_length, validate_identity_number, NIN_LENGTH};
use crate::config::Config;
use crate::db;
use crate::error::RowError;
use crate::location::{LocationResolver, Resolution, UnknownVillageMap};
use crate::models::{NormalizedRecord, RawRecord};
use crate::normalize::normalize;
use crate::photos::PhotoArchive;
use crate::profile::{ImportProfile, UnknownRegionPolicy};
use crate::reconcile::{Outcome, Reconciler};
use crate::sqlite_store::SqliteStore;
use crate::store::Store;

/// A row that could not be imported.
#[derive(Debug)]
pub struct RowFailure {
    /// 1-based data row number (the header is row 0).
    pub row: u64,
    pub chf_id: String,
    pub error: RowError,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Created households placed in an unknown-village placeholder.
    pub fallbacks: u64,
    pub failures: Vec<RowFailure>,
}

impl ImportSummary {
    pub fn errors(&self) -> u64 {
        self.failures.len() as u64
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "total: {}, created: {}, updated: {}, skipped: {}, fallback: {}, errors: {}",
            self.total,
            self.created,
            self.updated,
            self.skipped,
            self.fallbacks,
            self.errors()
        )
    }
}

/// Identity of the system actor and officer recorded on writes.
#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub officer_id: i64,
    pub audit_user_id: i64,
    pub global_unknown_village_id: i64,
}

impl ImportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            officer_id: config.import.officer_id,
            audit_user_id: config.import.audit_user_id,
            global_unknown_village_id: config.locations.global_unknown_village_id,
        }
    }
}

pub struct Importer<'a> {
    profile: &'a ImportProfile,
    resolver: LocationResolver<'a>,
    reconciler: Reconciler<'a>,
}

impl<'a> Importer<'a> {
    pub fn new(
        store: &'a dyn Store,
        profile: &'a ImportProfile,
        unknown_villages: &'a UnknownVillageMap,
        photos: &'a PhotoArchive,
        settings: ImportSettings,
    ) -> Self {
        Self {
            profile,
            resolver: LocationResolver::new(
                store,
                unknown_villages,
                profile.unknown_region,
                settings.global_unknown_village_id,
            ),
            reconciler: Reconciler::new(
                store,
                photos,
                profile.existing,
                settings.officer_id,
                settings.audit_user_id,
            ),
        }
    }

    /// Import every row from `input`. Only an unreadable header is fatal.
    pub async fn import_reader<R: Read>(&self, input: R) -> Result<ImportSummary> {
        let delimiter = self
            .profile
            .delimiter_byte()
            .context("delimiter must be a single ASCII character")?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(input);
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read the header row")?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut summary = ImportSummary::default();
        for (index, result) in reader.records().enumerate() {
            let row = index as u64 + 1;
            summary.total += 1;

            let raw: RawRecord = match result {
                Ok(record) => headers.iter().map(String::as_str).zip(record.iter()).collect(),
                Err(e) => {
                    record_failure(&mut summary, row, String::new(), RowError::Malformed(e.to_string()));
                    continue;
                }
            };

            let record = normalize(&raw, self.profile);
            match self.import_record(row, &record).await {
                Ok((outcome, resolution)) => {
                    match outcome {
                        Outcome::Created { insuree_id, family_id } => {
                            // Only a new household is actually placed at the resolved location.
                            if resolution.is_fallback() {
                                summary.fallbacks += 1;
                                warn!(row, chf_id = %record.chf_id, location_id = resolution.location_id(), "village not found, using placeholder");
                            }
                            summary.created += 1;
                            info!(row, chf_id = %record.chf_id, insuree_id, family_id, "created");
                        }
                        Outcome::Updated { insuree_id } => {
                            summary.updated += 1;
                            info!(row, chf_id = %record.chf_id, insuree_id, "updated");
                        }
                        Outcome::Skipped { insuree_id } => {
                            summary.skipped += 1;
                            warn!(row, chf_id = %record.chf_id, insuree_id, "already exists, skipped");
                        }
                    }
                }
                Err(e) => record_failure(&mut summary, row, record.chf_id.clone(), e),
            }
        }
        Ok(summary)
    }

    async fn import_record(
        &self,
        row: u64,
        record: &NormalizedRecord,
    ) -> Result<(Outcome, Resolution), RowError> {
        if record.chf_id.is_empty() {
            return Err(RowError::MissingIdentity);
        }
        if self.profile.validate_nin {
            if !validate_identity_number(&record.chf_id) {
                return Err(RowError::InvalidChecksum(record.chf_id.clone()));
            }
            if !has_valid_length(&record.chf_id) {
                return Err(RowError::InvalidLength {
                    nin: record.chf_id.clone(),
                    len: record.chf_id.chars().count(),
                    expected: NIN_LENGTH,
                });
            }
        }
        if record.details.dob.is_none() && !record.dob_text.is_empty() {
            warn!(row, chf_id = %record.chf_id, dob = %record.dob_text, "unparseable date of birth, stored empty");
        }

        let resolution = self.resolver.resolve(&record.locations).await?;
        let outcome = self
            .reconciler
            .reconcile(record, resolution.location_id())
            .await?;
        Ok((outcome, resolution))
    }
}

fn record_failure(summary: &mut ImportSummary, row: u64, chf_id: String, error: RowError) {
    error!(row, chf_id = %chf_id, reason = error.reason(), "{}", error);
    summary.failures.push(RowFailure { row, chf_id, error });
}

/// Fail unless every current LGA has an unknown-village placeholder.
pub async fn check_placeholders(store: &dyn Store, map: &UnknownVillageMap) -> Result<()> {
    let lgas = store.active_lgas().await?;
    let missing = map.missing(&lgas);
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|lga| format!("{} (id {})", lga.name, lga.id))
            .collect();
        bail!(
            "locations.unknown_villages has no placeholder for: {}",
            names.join(", ")
        );
    }
    Ok(())
}

/// Read the whole input file, dropping a UTF-8 byte-order mark.
pub fn read_input(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!("{} is not a correct file path", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    Ok(match content.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => content,
    })
}

pub async fn run_import(config: &Config, path: &Path, profile: Option<&str>) -> Result<ImportSummary> {
    let profile = config.profile(profile)?;
    let content = read_input(path)?;
    let unknown_villages = config.unknown_villages()?;
    let settings = ImportSettings::from_config(config);

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    check_placeholders(&store, &unknown_villages).await?;
    if profile.unknown_region == UnknownRegionPolicy::Fallback
        && store
            .get_location(settings.global_unknown_village_id)
            .await?
            .is_none()
    {
        bail!(
            "locations.global_unknown_village_id {} does not exist",
            settings.global_unknown_village_id
        );
    }

    let photos = PhotoArchive::new(&config.photos.root);
    info!(file = %path.display(), photos = %photos.root().display(), "importing insurees");

    let importer = Importer::new(&store, &profile, &unknown_villages, &photos, settings);
    let summary = importer.import_reader(content.as_bytes()).await?;

    println!("import {}", path.display());
    println!("  {}", summary.summary_line());
    for failure in &summary.failures {
        println!(
            "  error row {} [{}]: {}",
            failure.row,
            if failure.chf_id.is_empty() { "-" } else { failure.chf_id.as_str() },
            failure.error
        );
    }
    println!("{}", if summary.is_clean() { "ok" } else { "completed with errors" });

    store.pool().close().await;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationType;
    use crate::profile::ExistingPolicy;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const HEADER: &str = "nin,familyName,givenName,dateOfBirth,sex,registrationLga,registrationDistrict,registrationVillage,residentialLga,residentialDistrict,residentialVillage";

    fn hierarchy() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_location(1, "The Gambia", LocationType::Nation, None);
        store.add_location(10, "Banjul", LocationType::Lga, Some(1));
        store.add_location(100, "Banjul Central", LocationType::District, Some(10));
        store.add_location(1000, "Half Die", LocationType::Village, Some(100));
        store.add_location(4873, "Unknown", LocationType::Village, Some(100));
        store
    }

    fn settings() -> ImportSettings {
        ImportSettings {
            officer_id: 1,
            audit_user_id: 1,
            global_unknown_village_id: 5857,
        }
    }

    async fn run(store: &InMemoryStore, profile: &ImportProfile, csv: &str) -> ImportSummary {
        let tmp = TempDir::new().unwrap();
        let photos = PhotoArchive::new(tmp.path());
        let map = UnknownVillageMap::new(HashMap::from([(10, 4873)]));
        Importer::new(store, profile, &map, &photos, settings())
            .import_reader(csv.as_bytes())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_bad_row_does_not_block_the_rest() {
        let store = hierarchy();
        let csv = format!(
            "{}\n\
             123456789015,Jallow,Fatou,1990-03-14,FEMALE,Banjul,Banjul Central,Half Die,,,\n\
             123456789010,Bad,Checksum,1990-03-14,MALE,Banjul,Banjul Central,Half Die,,,\n\
             79927398713,Short,Number,1990-03-14,MALE,Banjul,Banjul Central,Half Die,,,\n\
             200000000006,Ceesay,Awa,1985-01-01,FEMALE,Nowhere,X,Y,,,\n\
             300000000004,Touray,Modou,1970-07-07,MALE,Banjul,X,Y,,,\n",
            HEADER
        );
        let summary = run(&store, &ImportProfile::default(), &csv).await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.fallbacks, 1);
        let reasons: Vec<(u64, &str)> = summary
            .failures
            .iter()
            .map(|f| (f.row, f.error.reason()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (2, "invalid_checksum"),
                (3, "invalid_length"),
                (4, "unknown_region"),
            ]
        );
        assert_eq!(store.all_insurees().len(), 2);
        let locations: Vec<i64> = store.all_families().iter().map(|f| f.location_id).collect();
        assert_eq!(locations, vec![1000, 4873]);
    }

    #[tokio::test]
    async fn test_reimport_updates_existing() {
        let store = hierarchy();
        let first = format!(
            "{}\n123456789015,Jallow,Fatou,1990-03-14,FEMALE,Banjul,Banjul Central,Half Die,,,\n",
            HEADER
        );
        let second = format!(
            "{}\n123456789015,Njie,Fatou,1990-03-14,FEMALE,Banjul,X,Y,,,\n",
            HEADER
        );
        let summary = run(&store, &ImportProfile::default(), &first).await;
        assert_eq!(summary.created, 1);

        let summary = run(&store, &ImportProfile::default(), &second).await;
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        // The household stays put, so the unmatched village is no fallback.
        assert_eq!(summary.fallbacks, 0);
        assert!(summary.is_clean());
        assert_eq!(store.all_families().len(), 1);
        assert_eq!(store.all_families()[0].location_id, 1000);
        assert_eq!(store.all_insurees().len(), 2);
    }

    #[tokio::test]
    async fn test_skip_policy_counts_skipped() {
        let store = hierarchy();
        let profile = ImportProfile {
            existing: ExistingPolicy::Skip,
            ..ImportProfile::default()
        };
        let csv = format!(
            "{}\n\
             123456789015,Jallow,Fatou,1990-03-14,FEMALE,Banjul,Banjul Central,Half Die,,,\n\
             123456789015,Jallow,Fatou,1990-03-14,FEMALE,Banjul,X,Y,,,\n",
            HEADER
        );
        let summary = run(&store, &profile, &csv).await;
        assert_eq!((summary.created, summary.skipped), (1, 1));
        assert_eq!(summary.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_malformed_and_missing_identity_rows() {
        let store = hierarchy();
        let csv = format!(
            "{}\n\
             123456789015,Jallow\n\
             ,NoId,Person,1990-03-14,MALE,Banjul,Banjul Central,Half Die,,,\n",
            HEADER
        );
        let summary = run(&store, &ImportProfile::default(), &csv).await;
        assert_eq!(summary.total, 2);
        let reasons: Vec<&str> = summary.failures.iter().map(|f| f.error.reason()).collect();
        assert_eq!(reasons, vec!["malformed", "missing_identity"]);
        assert!(store.all_insurees().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_isolated() {
        let store = hierarchy();
        store.fail_writes_for("123456789015");
        let csv = format!(
            "{}\n\
             123456789015,Jallow,Fatou,1990-03-14,FEMALE,Banjul,Banjul Central,Half Die,,,\n\
             200000000006,Ceesay,Awa,1985-01-01,FEMALE,Banjul,Banjul Central,Half Die,,,\n",
            HEADER
        );
        let summary = run(&store, &ImportProfile::default(), &csv).await;
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].chf_id, "123456789015");
        assert_eq!(summary.failures[0].error.reason(), "persistence");
        // The failed row left no household or photo row behind.
        assert_eq!(store.all_insurees().len(), 1);
        assert_eq!(store.all_families().len(), 1);
        assert_eq!(store.all_photos().len(), 1);
        assert_eq!(store.all_families()[0].head_insuree_id, Some(store.all_insurees()[0].id));
    }

    #[tokio::test]
    async fn test_legacy_profile_semicolons_without_validation() {
        let store = hierarchy();
        let csv = "nin;family_name;given_name;date_of_birth;sex;national_subdivision;district;city\n\
                   LEGACY-1;Touray;Modou;07/07/1970;MALE;Banjul;Banjul Central;Half Die\n\
                   LEGACY-2;Sowe;Isatou;01/02/1980;FEMALE;Nowhere;X;Y\n";
        let summary = run(&store, &ImportProfile::legacy(), csv).await;
        assert_eq!(summary.created, 2);
        assert_eq!(summary.fallbacks, 1);
        assert!(summary.is_clean());
        let insurees = store.all_insurees();
        assert_eq!(
            insurees[0].details.dob,
            chrono::NaiveDate::from_ymd_opt(1970, 7, 7)
        );
        let locations: Vec<i64> = store.all_families().iter().map(|f| f.location_id).collect();
        assert_eq!(locations, vec![1000, 5857]);
    }

    #[tokio::test]
    async fn test_placeholder_check() {
        let store = hierarchy();
        assert!(check_placeholders(&store, &UnknownVillageMap::new(HashMap::from([(10, 4873)])))
            .await
            .is_ok());
        let err = check_placeholders(&store, &UnknownVillageMap::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Banjul (id 10)"));
    }

    #[test]
    fn test_read_input_strips_bom() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rows.csv");
        std::fs::write(&path, "\u{feff}nin\n1\n").unwrap();
        assert_eq!(read_input(&path).unwrap(), "nin\n1\n");
        assert!(read_input(&tmp.path().join("missing.csv")).is_err());
    }
}
