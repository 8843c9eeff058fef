//! Loading interaction data from disk.
use std::path::{Path, PathBuf};

use csv;
use failure;
use failure::Fail;

use tracing::info;

use crate::data::{Interaction, Interactions};

/// Name of the interactions file inside a data directory.
pub const INTERACTIONS_FILE: &str = "interactions.csv";

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// The data directory does not exist.
    #[fail(display = "Data directory {:?} does not exist.", _0)]
    MissingDataDir(PathBuf),
    /// The data directory has no interactions file.
    #[fail(display = "Interactions file {:?} does not exist.", _0)]
    MissingFile(PathBuf),
}

/// Read `interactions.csv` from `data_dir`.
///
/// The file has a header and the columns `user_id,item_id,timestamp`.
pub fn load_interactions<P: AsRef<Path>>(data_dir: P) -> Result<Interactions, failure::Error> {
    let data_dir = data_dir.as_ref();

    if !data_dir.is_dir() {
        return Err(DatasetError::MissingDataDir(data_dir.to_owned()).into());
    }

    let path = data_dir.join(INTERACTIONS_FILE);
    if !path.is_file() {
        return Err(DatasetError::MissingFile(path).into());
    }

    let mut reader = csv::Reader::from_path(&path)?;
    let interactions: Vec<Interaction> = reader.deserialize().collect::<Result<Vec<_>, _>>()?;

    info!(path = %path.display(), num_interactions = interactions.len(), "Loaded interactions");

    Ok(Interactions::from(interactions))
}
