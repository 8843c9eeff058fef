#[macro_use]
extern crate criterion;

use criterion::Criterion;

use rand::distributions::{Distribution, Uniform};
use rand::prng::XorShiftRng;
use rand::SeedableRng;

use gru4rec::data::Batch;
use gru4rec::models::gru4rec::Hyperparameters;
use gru4rec::models::LossKind;

const NUM_ITEMS: usize = 5000;
const BATCH_SIZE: usize = 32;
const SEQUENCE_LENGTH: usize = 10;

fn synthetic_batch(rng: &mut XorShiftRng) -> Batch {
    let items = Uniform::new(0, NUM_ITEMS);
    let mut item = || format!("{}", items.sample(rng));

    let contexts = (0..BATCH_SIZE)
        .map(|_| (0..SEQUENCE_LENGTH).map(|_| item()).collect())
        .collect();
    let labels = (0..BATCH_SIZE).map(|_| item()).collect();

    Batch::new(contexts, labels).unwrap()
}

fn bench_train_step(c: &mut Criterion, name: &str, loss: LossKind) {
    let mut rng = XorShiftRng::from_seed([42; 16]);
    let batch = synthetic_batch(&mut rng);
    let item_counts: Vec<_> = (0..NUM_ITEMS)
        .map(|idx| (format!("{}", idx), (NUM_ITEMS - idx) as u64))
        .collect();

    let mut model = Hyperparameters::new(32)
        .loss(loss)
        .num_negatives(100)
        .from_seed([42; 16])
        .build(item_counts)
        .unwrap();

    c.bench_function(name, move |b| {
        b.iter(|| {
            model.train_step(&batch).unwrap();
        })
    });
}

fn bench_vanilla(c: &mut Criterion) {
    bench_train_step(c, "train_step_vanilla_sm", LossKind::VanillaSoftmax);
}

fn bench_sampled(c: &mut Criterion) {
    bench_train_step(c, "train_step_sampled_sm", LossKind::SampledSoftmax);
}

criterion_group!{
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_vanilla, bench_sampled
}
criterion_main!(benches);
