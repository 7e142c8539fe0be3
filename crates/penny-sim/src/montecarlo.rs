use penny_core::RandomSource;

/// Parameters for one Monte-Carlo classification-probability run.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloConfig {
    pub runs: u64,
    pub max_n: usize,
    pub max_dups: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            runs: 1_000_000,
            max_n: 400,
            max_dups: 50,
        }
    }
}

/// One `(n, d)` cell of the classification-probability table: across every
/// sampled run with a flow of length `n` and `d` attacker-sent duplicates,
/// the fraction that landed in each outcome bucket.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloRow {
    pub n: usize,
    pub d: usize,
    pub total: u64,
    pub max_dups_prob: f64,
    pub bidir_prob: f64,
    pub non_bidir_prob: f64,
    pub undecided_prob: f64,
}

const DROP_FRAC: f64 = 0.05;
const PROB_LEGIT_SRC: f64 = 0.95;
const MAX_DUP_THRESH: f64 = 0.15;
const H1_H2_RATIO: f64 = 0.01;

/// For every `(n, d)` pair, simulates a monitor that sees a 5% independent
/// packet-drop rate and an attacker who duplicates the first `d` packets,
/// then classifies with the same likelihood-ratio test as the detector core
/// and tallies outcome probabilities over `cfg.runs` samples.
pub fn run(cfg: &MonteCarloConfig, rng: &mut dyn RandomSource) -> Vec<MonteCarloRow> {
    let mut undecided = vec![vec![0u64; cfg.max_dups]; cfg.max_n];
    let mut bidir = vec![vec![0u64; cfg.max_dups]; cfg.max_n];
    let mut non_bidir = vec![vec![0u64; cfg.max_dups]; cfg.max_n];
    let mut max_dups_hits = vec![vec![0u64; cfg.max_dups]; cfg.max_n];
    let mut totals = vec![vec![0u64; cfg.max_dups]; cfg.max_n];

    for _ in 0..cfg.runs {
        for dups in 2..cfg.max_dups {
            let mut dup_count = 0usize;
            let mut orig_dup_count = 0usize;
            let mut drop_count = 0usize;
            let mut correct_count = 0usize;

            for n in 1..cfg.max_n {
                let dropped = rng.bernoulli(DROP_FRAC);
                let duplicated = n <= dups;

                if dropped && duplicated {
                    correct_count += 1;
                    drop_count += 1;
                    orig_dup_count += 1;
                } else if dropped {
                    drop_count += 1;
                } else if duplicated {
                    dup_count += 1;
                    orig_dup_count += 1;
                }

                if orig_dup_count >= cfg.max_dups {
                    break;
                }
                if n < dups {
                    continue;
                }

                totals[n][dup_count] += 1;

                // Deliberately uses this packet's own `dropped` flag, not
                // the running `drop_count`, in both the guard and the
                // denominator below — preserved as-is rather than patched.
                let denom = n as f64 - if dropped { 1.0 } else { 0.0 };
                if n != usize::from(dropped) && dup_count as f64 / denom > MAX_DUP_THRESH {
                    max_dups_hits[n][orig_dup_count] += 1;
                } else {
                    let h1 = (1.0 - PROB_LEGIT_SRC).powi((drop_count - correct_count) as i32);
                    let h2 = if dup_count == 0 {
                        (1.0 / n as f64).powi(correct_count as i32)
                    } else {
                        (dup_count as f64 / n as f64).powi(correct_count as i32)
                    };
                    let p_bidir = h1 / (h1 + h2);
                    if p_bidir > 1.0 - H1_H2_RATIO {
                        bidir[n][orig_dup_count] += 1;
                    } else if p_bidir < H1_H2_RATIO {
                        non_bidir[n][orig_dup_count] += 1;
                    } else {
                        undecided[n][orig_dup_count] += 1;
                    }
                }
            }
        }
    }

    let mut rows = Vec::new();
    for n in 1..cfg.max_n {
        for d in 0..cfg.max_dups {
            let total = totals[n][d];
            if total == 0 {
                continue;
            }
            rows.push(MonteCarloRow {
                n,
                d,
                total,
                max_dups_prob: max_dups_hits[n][d] as f64 / total as f64,
                bidir_prob: bidir[n][d] as f64 / total as f64,
                non_bidir_prob: non_bidir[n][d] as f64 / total as f64,
                undecided_prob: undecided[n][d] as f64 / total as f64,
            });
        }
    }
    rows
}
