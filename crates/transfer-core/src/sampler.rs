//! Picks which chunks get a per-chunk checksum. Every chunk still counts
//! toward the final whole-file hash; sampling only trades per-chunk
//! integrity checks for CPU time on very large transfers.

use std::collections::HashSet;

use rand::seq::SliceRandom;

/// Decides the sampling rate for a file of the given size.
fn sample_rate(file_size: u64) -> f64 {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;
    if file_size < 100 * MIB {
        1.0
    } else if file_size < GIB {
        0.1
    } else {
        0.01
    }
}

/// Chooses the set of chunk indices that will carry a per-chunk checksum.
/// Indices `0`, `total_chunks - 1`, and `total_chunks / 2` are always
/// included; the remainder is filled uniformly at random without
/// replacement until `max(3, floor(total_chunks * rate))` indices are
/// selected.
pub fn select_sampled_indices(total_chunks: u32, file_size: u64) -> HashSet<u32> {
    if total_chunks == 0 {
        return HashSet::new();
    }
    let rate = sample_rate(file_size);
    let target = ((total_chunks as f64 * rate).floor() as usize).max(3).min(total_chunks as usize);

    let mut chosen = HashSet::new();
    chosen.insert(0);
    chosen.insert(total_chunks - 1);
    chosen.insert(total_chunks / 2);

    if chosen.len() >= target {
        return chosen;
    }

    let mut remaining: Vec<u32> = (0..total_chunks).filter(|i| !chosen.contains(i)).collect();
    let mut rng = rand::rng();
    remaining.shuffle(&mut rng);

    let need = target - chosen.len();
    chosen.extend(remaining.into_iter().take(need));
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunks_selects_nothing() {
        assert!(select_sampled_indices(0, 0).is_empty());
    }

    #[test]
    fn small_file_samples_everything() {
        let sampled = select_sampled_indices(10, 1024);
        assert_eq!(sampled.len(), 10);
    }

    #[test]
    fn mandatory_indices_always_present() {
        let total = 1000;
        let sampled = select_sampled_indices(total, 500 * 1024 * 1024);
        assert!(sampled.contains(&0));
        assert!(sampled.contains(&(total - 1)));
        assert!(sampled.contains(&(total / 2)));
    }

    #[test]
    fn huge_file_samples_at_least_three() {
        let total = 50;
        let sampled = select_sampled_indices(total, 2 * 1024 * 1024 * 1024);
        assert!(sampled.len() >= 3);
        assert!(sampled.len() <= total as usize);
    }

    #[test]
    fn single_chunk_file_samples_it() {
        let sampled = select_sampled_indices(1, 10);
        assert_eq!(sampled, HashSet::from([0]));
    }
}
