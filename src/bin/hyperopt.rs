use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::prng::XorShiftRng;
use rand::SeedableRng;
use tracing::{info, warn};

use gru4rec::data::{user_based_split, Example};
use gru4rec::datasets::load_interactions;
use gru4rec::models::gru4rec::Hyperparameters;
use gru4rec::ItemId;

/// Random search over GRU4Rec hyperparameters.
#[derive(Parser, Debug)]
#[command(name = "hyperopt", version)]
struct Args {
    /// Directory holding interactions.csv
    #[arg(long)]
    data_dir: PathBuf,

    /// Number of hyperparameter settings to try
    #[arg(long, default_value_t = 100)]
    num_trials: usize,

    /// Items of history per example
    #[arg(long, default_value_t = 10)]
    context_length: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u8,
}

struct Trial {
    recall: f32,
    elapsed: Duration,
    hyperparameters: Hyperparameters,
}

fn run_trial(
    hyper: Hyperparameters,
    item_counts: Vec<(ItemId, u64)>,
    train: &[Example],
    test: &[Example],
) -> Result<f32, failure::Error> {
    let mut model = hyper.build(item_counts)?;
    model.fit(train)?;

    let metrics = model.evaluate(test)?;
    let recall = metrics
        .iter()
        .find(|&(name, _)| name.starts_with("recall@"))
        .map_or(0.0, |(_, &value)| value);

    Ok(recall)
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("gru4rec=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut rng = XorShiftRng::from_seed([args.seed; 16]);

    let data = load_interactions(&args.data_dir)?;
    let (train, test) = user_based_split(&data, &mut rng, 0.2);
    let item_counts = train.item_counts();
    let train_examples = train.to_examples(args.context_length);
    let test_examples = test.to_examples(args.context_length);

    let mut best: Option<Trial> = None;

    for _ in 0..args.num_trials {
        let hyper = Hyperparameters::random(&mut rng);

        let start = Instant::now();
        let result = run_trial(
            hyper.clone(),
            item_counts.clone(),
            &train_examples,
            &test_examples,
        );
        let elapsed = start.elapsed();

        let recall = match result {
            Ok(recall) => recall,
            Err(error) => {
                warn!(%error, "Trial failed");
                continue;
            }
        };

        println!(
            "Recall {} for hyperparams: {:#?} (elapsed {:#?})",
            recall, &hyper, elapsed
        );

        let improved = best.as_ref().map_or(true, |trial| recall > trial.recall);
        if recall.is_finite() && improved {
            best = Some(Trial {
                recall,
                elapsed,
                hyperparameters: hyper,
            });
        }

        if let Some(ref trial) = best {
            info!(recall = trial.recall, elapsed = ?trial.elapsed, "Best so far");
            println!("Best result: {:#?}", trial.hyperparameters);
        }
    }

    Ok(())
}
