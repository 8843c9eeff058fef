use std::fs;
use std::path::PathBuf;

use clap::Parser;
use failure::err_msg;
use rand::prng::XorShiftRng;
use rand::SeedableRng;
use tracing::info;

use gru4rec::config::{self, Config};
use gru4rec::data::user_based_split;
use gru4rec::datasets::load_interactions;
use gru4rec::models::gru4rec::Hyperparameters;

/// Train a GRU4Rec model and evaluate it on held-out users.
#[derive(Parser, Debug)]
#[command(name = "train", version)]
struct Args {
    /// JSON file with configuration keys
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override a configuration key, as `key=value`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Directory holding interactions.csv
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Loss: vanilla-sm or sampled-sm
    #[arg(long)]
    loss: Option<String>,

    /// Number of training epochs
    #[arg(long)]
    nb_epochs: Option<usize>,

    /// Examples per training step
    #[arg(long)]
    batch_size: Option<usize>,

    /// Embedding and hidden state dimensionality
    #[arg(long)]
    embedding_dimension: Option<usize>,

    /// Items of history per example
    #[arg(long, default_value_t = 10)]
    context_length: usize,

    /// Fraction of users held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f32,

    /// Negatives per example for the sampled softmax
    #[arg(long, default_value_t = 100)]
    num_negatives: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl Args {
    fn config(&self) -> Result<Config, failure::Error> {
        let from_file = match self.config {
            Some(ref path) => Config::from_json(&fs::read_to_string(path)?)?,
            None => Config::default(),
        };

        let mut pairs = Vec::with_capacity(self.overrides.len());
        for pair in &self.overrides {
            pairs.push(
                config::parse_pair(pair)
                    .ok_or_else(|| err_msg(format!("Expected key=value, got {:?}", pair)))?,
            );
        }

        let from_flags = Config {
            data_dir: self.data_dir.clone(),
            loss: self.loss.clone(),
            nb_epochs: self.nb_epochs,
            batch_size: self.batch_size,
            embedding_dimension: self.embedding_dimension,
        };

        Ok(from_file
            .merge(Config::from_pairs(pairs))
            .merge(from_flags))
    }

    fn seed(&self) -> [u8; 16] {
        let mut seed = [0; 16];
        for (idx, byte) in seed.iter_mut().enumerate() {
            *byte = (self.seed >> (8 * (idx % 8))) as u8;
        }

        seed
    }
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("gru4rec=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.config()?;
    info!(?config, "Starting training run");

    let data_dir = config
        .data_dir
        .clone()
        .ok_or_else(|| err_msg("No data directory: pass --data-dir or set data_dir"))?;

    let data = load_interactions(&data_dir)?;
    let mut rng = XorShiftRng::from_seed(args.seed());
    let (train, test) = user_based_split(&data, &mut rng, args.test_fraction);

    let train_examples = train.to_examples(args.context_length);
    let test_examples = test.to_examples(args.context_length);
    info!(
        train = train_examples.len(),
        test = test_examples.len(),
        "Built examples"
    );

    let mut model = Hyperparameters::new(32)
        .num_negatives(args.num_negatives)
        .rng(rng)
        .from_config(&config)?
        .build(train.item_counts())?;

    let loss = model.fit(&train_examples)?;
    info!(loss, "Training finished");

    let metrics = model.evaluate(&test_examples)?;
    for (name, value) in &metrics {
        info!(metric = %name, value = *value, "Test metric");
    }

    Ok(())
}
