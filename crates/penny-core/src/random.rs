/// External pseudo-random source. `penny-core` never seeds or
/// owns an RNG of its own; every probabilistic decision is drawn through
/// this trait so the core stays deterministic given a deterministic caller.
pub trait RandomSource {
    /// Returns `true` with probability `p` (`p` in `[0, 1]`).
    fn bernoulli(&mut self, p: f64) -> bool;
    /// Returns an integer in `[lo, hi]`, inclusive.
    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64;
    /// Returns a real in `[lo, hi)`.
    fn uniform_real(&mut self, lo: f64, hi: f64) -> f64;
    /// Returns an index in `[0, n)`.
    fn uniform_choice(&mut self, n: usize) -> usize;
}
