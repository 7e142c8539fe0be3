use std::fs;
use std::io::Write;
use std::path::Path;

use penny_core::export::ExportResult;

/// Persists one run's [`ExportResult`] as a single line of JSON at
/// `<results_dir>/<experiment_folder>/<topo_id>_<drop_rate>_<seed>.txt`.
/// I/O failures are logged and swallowed rather than propagated — a failed
/// write must never take down an otherwise-finished detection run.
pub fn persist_result(
    results_dir: &Path,
    experiment_folder: &str,
    topo_id: &str,
    drop_rate: f64,
    seed: u64,
    result: &ExportResult,
) {
    let dir = results_dir.join(experiment_folder);
    if let Err(err) = fs::create_dir_all(&dir) {
        tracing::error!(?err, dir = %dir.display(), "failed to create results directory");
        return;
    }

    let path = dir.join(format!("{topo_id}_{drop_rate}_{seed}.txt"));
    let mut file = match fs::File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(?err, path = %path.display(), "failed to create result file");
            return;
        }
    };

    if let Err(err) = serde_json::to_writer(&mut file, result) {
        tracing::error!(?err, path = %path.display(), "failed to serialize result");
        return;
    }
    if let Err(err) = writeln!(file) {
        tracing::error!(?err, path = %path.display(), "failed to finalize result file");
    }
}
