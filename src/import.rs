use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::model::PredictionPayload;
use crate::store::{NewFixture, SubmissionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub match_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub payload: PredictionPayload,
}

/// Well-formed records handed over by the sign-up, schedule and submission surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFile {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub fixtures: Vec<NewFixture>,
    #[serde(default)]
    pub predictions: Vec<PredictionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub fixtures: usize,
    pub predictions: usize,
    pub rejected: Vec<String>,
}

pub fn load_import_file(path: &Path) -> Result<ImportFile> {
    let raw = fs::read_to_string(path)?;
    parse_import_json(&raw)
}

pub fn parse_import_json(raw: &str) -> Result<ImportFile> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ImportFile::default());
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Applies users, then fixtures, then predictions. A prediction the store refuses
/// (locked match, unknown user or match) is reported and the rest still go in.
pub fn apply_import<S: SubmissionStore + ?Sized>(
    store: &mut S,
    file: &ImportFile,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for user in &file.users {
        let name = if user.display_name.trim().is_empty() {
            user.user_id.as_str()
        } else {
            user.display_name.as_str()
        };
        store.register_user(&user.user_id, name)?;
        summary.users += 1;
    }
    for fixture in &file.fixtures {
        store.add_fixture(fixture)?;
        summary.fixtures += 1;
    }
    for record in &file.predictions {
        match store.submit_prediction(&record.match_id, &record.user_id, &record.payload) {
            Ok(()) => summary.predictions += 1,
            Err(err) => summary
                .rejected
                .push(format!("{}/{}: {err}", record.match_id, record.user_id)),
        }
    }
    info!(
        users = summary.users,
        fixtures = summary.fixtures,
        predictions = summary.predictions,
        rejected = summary.rejected.len(),
        "import applied"
    );
    Ok(summary)
}
