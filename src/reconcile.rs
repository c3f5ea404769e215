//! Record reconciliation: create a new person or update the existing one.
//!
//! The identity key (chf id) decides. A new key gets a household at the
//! resolved location, a head-of-household person and a photo row. A known
//! key gets its current version archived and its details overwritten;
//! household location and photo of an existing person are never changed
//! here (the location cleanup job is the only place households move).
//!
//! Each outcome is one store call, so a failed row leaves no partial
//! household behind. A photo file is written first and removed again if the
//! store rejects the household.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::RowError;
use crate::models::{Insuree, NewFamily, NewHousehold, NewInsuree, NewPhoto, NormalizedRecord};
use crate::photos::PhotoArchive;
use crate::profile::ExistingPolicy;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created { insuree_id: i64, family_id: i64 },
    Updated { insuree_id: i64 },
    /// The person exists and the profile does not update existing persons.
    Skipped { insuree_id: i64 },
}

pub struct Reconciler<'a> {
    store: &'a dyn Store,
    photos: &'a PhotoArchive,
    existing: ExistingPolicy,
    officer_id: i64,
    audit_user_id: i64,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn Store,
        photos: &'a PhotoArchive,
        existing: ExistingPolicy,
        officer_id: i64,
        audit_user_id: i64,
    ) -> Self {
        Self {
            store,
            photos,
            existing,
            officer_id,
            audit_user_id,
        }
    }

    /// Reconcile one record whose household location is `location_id`.
    pub async fn reconcile(
        &self,
        record: &NormalizedRecord,
        location_id: i64,
    ) -> Result<Outcome, RowError> {
        let existing = self
            .store
            .find_insuree(&record.chf_id)
            .await
            .map_err(RowError::Persistence)?;

        match existing {
            Some(insuree) if self.existing == ExistingPolicy::Skip => {
                Ok(Outcome::Skipped {
                    insuree_id: insuree.id,
                })
            }
            Some(insuree) => self
                .update(insuree, record)
                .await
                .map_err(RowError::Persistence),
            None => self.create(record, location_id).await,
        }
    }

    async fn update(&self, current: Insuree, record: &NormalizedRecord) -> Result<Outcome> {
        let now = Utc::now().timestamp();
        let mut live = current.clone();
        live.details = record.details.clone();
        live.json_ext = Some(record.raw.clone());
        live.validity_from = now;
        live.audit_user_id = self.audit_user_id;
        self.store.archive_and_save(&current, &live, now).await?;

        debug!(chf_id = %live.chf_id, insuree_id = live.id, "archived and updated");
        Ok(Outcome::Updated {
            insuree_id: live.id,
        })
    }

    async fn create(&self, record: &NormalizedRecord, location_id: i64) -> Result<Outcome, RowError> {
        // Decode before writing anything so a bad payload leaves no trace.
        let image = record
            .photo
            .as_deref()
            .map(PhotoArchive::decode)
            .transpose()?;

        let today = Utc::now().date_naive();
        let stored = match image {
            Some(bytes) => {
                if !PhotoArchive::is_safe_name(&record.chf_id) {
                    return Err(RowError::UnsafePhotoName(record.chf_id.clone()));
                }
                Some(
                    self.photos
                        .store(&record.chf_id, today, &bytes)
                        .map_err(RowError::Persistence)?,
                )
            }
            None => None,
        };

        let mut details = record.details.clone();
        details.head = true;
        let (folder, filename) = stored
            .clone()
            .map(|s| (s.folder, s.filename))
            .unwrap_or_default();
        let household = NewHousehold {
            family: NewFamily {
                location_id,
                audit_user_id: self.audit_user_id,
            },
            head: NewInsuree {
                chf_id: record.chf_id.clone(),
                details,
                json_ext: record.raw.clone(),
                audit_user_id: self.audit_user_id,
            },
            photo: NewPhoto {
                chf_id: record.chf_id.clone(),
                folder,
                filename,
                photo_date: today,
                officer_id: self.officer_id,
                audit_user_id: self.audit_user_id,
            },
        };

        let created = match self.store.create_household(&household).await {
            Ok(created) => created,
            Err(e) => {
                if let Some(stored) = &stored {
                    if let Err(cleanup) = self.photos.remove(stored) {
                        warn!(chf_id = %record.chf_id, error = %cleanup, "orphaned photo file");
                    }
                }
                return Err(RowError::Persistence(e));
            }
        };

        debug!(
            chf_id = %record.chf_id,
            insuree_id = created.head.id,
            family_id = created.family.id,
            location_id,
            "created household"
        );
        Ok(Outcome::Created {
            insuree_id: created.head.id,
            family_id: created.family.id,
        })
    }
}
