use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Name of the cached registry export inside the data directory.
pub const CACHE_FILE: &str = "boletin_concursal.csv";

/// Drop folder for registry exports saved by hand from the portal.
pub const DOWNLOADS_DIR: &str = "downloads";

pub fn cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CACHE_FILE)
}

pub fn downloads_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(DOWNLOADS_DIR)
}

/// Write `bytes` to `dest` via a temp file in the same directory, so a
/// failed write never leaves a truncated cache behind.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("writing temp file")?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("moving download into {}", dest.display()))?;
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// If a `*.csv` in `<data_dir>/downloads` is newer than the cache, move it
/// over the cache file. CSVs beside the cache are never considered.
pub fn adopt_latest_csv(data_dir: &Path) -> Result<Option<PathBuf>> {
    let target = cache_path(data_dir);
    let pattern = format!(
        "{}/*.csv",
        glob::Pattern::escape(&downloads_dir(data_dir).display().to_string())
    );

    let newest = glob(&pattern)?
        .filter_map(Result::ok)
        .filter_map(|p| modified(&p).map(|t| (t, p)))
        .max_by_key(|(t, _)| *t);

    let Some((newest_time, newest_path)) = newest else {
        return Ok(None);
    };
    if let Some(current) = modified(&target) {
        if current >= newest_time {
            debug!(candidate = %newest_path.display(), "cache is newer; leaving candidate alone");
            return Ok(None);
        }
    }

    fs::rename(&newest_path, &target).with_context(|| {
        format!("renaming {} to {}", newest_path.display(), target.display())
    })?;
    info!(from = %newest_path.display(), "adopted newer CSV as cache");
    Ok(Some(target))
}
