// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a SEEDED generator and splits them:
//   - Training set:   the first (1 - validation_split) share
//   - Validation set: the last validation_split share
//
// The seed makes the split reproducible. A resumed training run
// must validate on exactly the same files as the run it resumes,
// so thread_rng() is not an option here.
//
// Split size: floor(total * validation_split) samples go to
// validation, the rest to training.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// # Arguments
/// * `samples`          - All available samples (consumed by this function)
/// * `validation_split` - Share held out for validation, e.g. 0.2 = 20%
/// * `seed`             - Shuffle seed; same seed → same split
pub fn split_train_val<T>(
    mut samples:      Vec<T>,
    validation_split: f64,
    seed:             u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total     = samples.len();
    let fraction  = validation_split.clamp(0.0, 1.0);
    let val_count = ((total as f64) * fraction).floor() as usize;
    let split_at  = total - val_count.min(total);

    // split_off(n) removes elements [n..] and returns them
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        samples.len(),
        val.len(),
        seed,
    );

    (samples, val)
}
