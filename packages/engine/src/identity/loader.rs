// packages/engine/src/identity/loader.rs
//! Loads identities from the configured JSON file

use crate::identity::record::{IdentityRecord, SecretSeed};
use crate::identity::session::SessionDescriptor;
use crate::utils::config::{SimulationConfig, WithdrawalConfig};
use crate::utils::errors::{Result, WorkerError};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// One entry of the identities file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityEntry {
    #[serde(alias = "tg_web_app_data")]
    pub tg_web_app_data: String,

    #[serde(alias = "seed_phrase")]
    pub seed_phrase: String,
}

/// Read and parse the identities file
pub async fn load_identities(
    path: &Path,
    simulation: &SimulationConfig,
    withdrawal: &WithdrawalConfig,
) -> Result<Vec<IdentityRecord>> {
    let file_error = |message: String| WorkerError::IdentityFile {
        path: path.display().to_string(),
        message,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| file_error(e.to_string()))?;

    let entries: Vec<IdentityEntry> =
        serde_json::from_str(&raw).map_err(|e| file_error(e.to_string()))?;

    let records = build_records(entries, simulation, withdrawal);
    if records.is_empty() {
        return Err(file_error("no usable identities".to_string()));
    }

    info!(
        "Loaded {} identities from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Turn file entries into records, skipping entries that cannot be parsed
pub fn build_records(
    entries: Vec<IdentityEntry>,
    simulation: &SimulationConfig,
    withdrawal: &WithdrawalConfig,
) -> Vec<IdentityRecord> {
    let mut records: Vec<IdentityRecord> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let session = match SessionDescriptor::parse(&entry.tg_web_app_data) {
            Ok(session) => session,
            Err(e) => {
                warn!("Skipping identity entry #{}: {}", index, e);
                continue;
            }
        };

        let seed = SecretSeed::new(entry.seed_phrase.trim());
        let reserved = is_reserved(&session, &seed, withdrawal);
        let record =
            IdentityRecord::new(session, seed, simulation.initial_clock).with_reserved(reserved);

        if records.iter().any(|existing| existing.id == record.id) {
            warn!(
                "Skipping identity entry #{}: duplicate identity {}",
                index, record.id
            );
            continue;
        }

        records.push(record);
    }

    records
}

fn is_reserved(
    session: &SessionDescriptor,
    seed: &SecretSeed,
    withdrawal: &WithdrawalConfig,
) -> bool {
    let by_seed = withdrawal
        .excluded_seed_phrase
        .as_deref()
        .map(|marker| !seed.is_empty() && marker.trim() == seed.expose())
        .unwrap_or(false);

    by_seed
        || withdrawal
            .excluded_identities
            .contains(&session.user_id().0)
}
