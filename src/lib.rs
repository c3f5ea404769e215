//! # Insuree Import
//!
//! Batch import and cleanup of civil-registration records for a
//! health-insurance enrollment registry.
//!
//! Delimited exports are read row by row, normalized through an import
//! profile, checked, placed in the LGA / district / village hierarchy and
//! then created or updated as persons heading their own household. A
//! separate job moves existing households onto the villages of a newer,
//! externally coded hierarchy.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌────────┐
//! │ CSV rows │──▶│ normalize │──▶│ checksum │──▶│ location  │──▶│reconcile│
//! └──────────┘   └───────────┘   └──────────┘   └───────────┘   └───┬────┘
//!                                                                    ▼
//! ┌──────────────┐   mapping table                             ┌──────────┐
//! │ repair (job) │◀──────────────────────────────────────────▶│  Store   │
//! └──────────────┘                                             │ (SQLite) │
//!                                                              └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`checksum`] | Identity number check digit |
//! | [`profile`] | Import profiles: delimiter, columns, policies |
//! | [`models`] | Core data types |
//! | [`normalize`] | Raw row → normalized record |
//! | [`location`] | Village resolution and unknown-village fallbacks |
//! | [`reconcile`] | Create or update a person and household |
//! | [`photos`] | Photo file storage |
//! | [`import`] | Import driver |
//! | [`repair`] | Household location cleanup driver |
//! | [`store`] | Storage trait and in-memory implementation |
//! | [`sqlite_store`] | SQLite storage |
//! | [`stats`] | Database overview |
//! | [`config`] | TOML configuration |
//! | [`error`] | Per-row errors |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod checksum;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod location;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod photos;
pub mod profile;
pub mod reconcile;
pub mod repair;
pub mod sqlite_store;
pub mod stats;
pub mod store;
