//! Load donors, donations, legacy meta and post meta rows from a YAML or JSON fixture.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{HealthError, Result};
use crate::model::{Donation, Donor};
use crate::output::{self, Format, ImportSummary};
use crate::store::sqlite::SqliteStore;
use crate::store::workspace::Workspace;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub donors: Vec<DonorSpec>,
    #[serde(default)]
    pub donations: Vec<DonationSpec>,
    #[serde(default)]
    pub legacy_meta: Vec<LegacyMetaSpec>,
    /// Payment post meta rows; same shape as legacy meta rows.
    #[serde(default)]
    pub postmeta: Vec<LegacyMetaSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DonorSpec {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub payment_ids: Vec<u64>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DonationSpec {
    pub id: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyMetaSpec {
    pub donation_id: u64,
    pub key: String,
    #[serde(default)]
    pub value: String,
}

pub fn run(base: &Path, source: String, format: Format) -> Result<()> {
    let store = Workspace::open(base)?.store()?;
    let raw = read_source(&source)?;
    let fixture = parse_fixture(&source, &raw)?;
    let summary = apply(&store, &fixture)?;
    tracing::info!(
        source = %source,
        donors = summary.donors,
        donations = summary.donations,
        legacy_meta = summary.legacy_meta,
        postmeta = summary.postmeta,
        "imported fixture"
    );
    output::print_import(&summary, format)
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut contents = String::new();
        std::io::stdin().read_to_string(&mut contents)?;
        return Ok(contents);
    }
    Ok(fs::read_to_string(source)?)
}

/// YAML parser; JSON documents parse as YAML too.
pub fn parse_fixture(source: &str, raw: &str) -> Result<Fixture> {
    if raw.trim().is_empty() {
        return Err(HealthError::InvalidInput(format!("source '{source}' is empty")));
    }
    serde_yaml::from_str(raw)
        .map_err(|e| HealthError::InvalidInput(format!("source '{source}': {e}")))
}

pub fn apply(store: &SqliteStore, fixture: &Fixture) -> Result<ImportSummary> {
    for spec in &fixture.donors {
        let donor = Donor {
            id: spec.id,
            email: spec.email.clone(),
            payment_ids: spec.payment_ids.clone(),
            external_customer_id: spec.customer_id.clone(),
        };
        store.insert_donor(&donor, &spec.meta)?;
    }
    for spec in &fixture.donations {
        let donation = Donation {
            id: spec.id,
            donor_id: None,
            created_at: spec.created_at.unwrap_or_else(Utc::now),
        };
        store.insert_donation(&donation, &spec.meta)?;
    }
    for row in &fixture.legacy_meta {
        store.insert_legacy_meta(row.donation_id, &row.key, &row.value)?;
    }
    for row in &fixture.postmeta {
        store.insert_postmeta(row.donation_id, &row.key, &row.value)?;
    }
    Ok(ImportSummary {
        donors: fixture.donors.len(),
        donations: fixture.donations.len(),
        legacy_meta: fixture.legacy_meta.len(),
        postmeta: fixture.postmeta.len(),
    })
}
