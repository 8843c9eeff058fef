//! Run configuration.
//!
//! Configuration comes either from plain `key=value` pairs or from a JSON
//! document with the same keys. Every field is optional; fields left unset
//! fall back to the model defaults.
use std::path::PathBuf;
use std::str::FromStr;

use serde_json;

use tracing::warn;

/// Options controlling a training run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the interaction data.
    pub data_dir: Option<PathBuf>,
    /// Loss name, `vanilla-sm` or `sampled-sm`.
    pub loss: Option<String>,
    /// Number of passes over the training data.
    pub nb_epochs: Option<usize>,
    /// Examples per training step.
    pub batch_size: Option<usize>,
    /// Item embedding and hidden state dimensionality.
    pub embedding_dimension: Option<usize>,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value, "Ignoring unparsable configuration value");
            None
        }
    }
}

impl Config {
    /// Build a configuration from key/value pairs.
    ///
    /// Unknown keys and values that fail to parse are logged and skipped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());

            match key {
                "data_dir" => config.data_dir = Some(PathBuf::from(value)),
                "loss" => config.loss = Some(value.trim().to_owned()),
                "nb_epochs" => config.nb_epochs = parse_value(key, value),
                "batch_size" => config.batch_size = parse_value(key, value),
                "embedding_dimension" => config.embedding_dimension = parse_value(key, value),
                _ => warn!(key, "Ignoring unknown configuration key"),
            }
        }

        config
    }

    /// Parse a JSON configuration. Unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Overlay the fields set in `other` onto `self`.
    pub fn merge(self, other: Config) -> Self {
        Config {
            data_dir: other.data_dir.or(self.data_dir),
            loss: other.loss.or(self.loss),
            nb_epochs: other.nb_epochs.or(self.nb_epochs),
            batch_size: other.batch_size.or(self.batch_size),
            embedding_dimension: other.embedding_dimension.or(self.embedding_dimension),
        }
    }
}

/// Split a `key=value` string.
pub fn parse_pair(pair: &str) -> Option<(String, String)> {
    let mut parts = pair.splitn(2, '=');

    match (parts.next(), parts.next()) {
        (Some(key), Some(value)) if !key.trim().is_empty() => {
            Some((key.trim().to_owned(), value.to_owned()))
        }
        _ => None,
    }
}
