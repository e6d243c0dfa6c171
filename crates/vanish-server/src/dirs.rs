use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// File name of the secret database inside the data directory.
pub const DB_FILE: &str = "vanish.db";

/// Directory holding [`DB_FILE`], created if missing.
///
/// `explicit` comes from `VANISH_DATA_DIR`; without it the platform data dir
/// is used (`~/.local/share/vanish/` on Linux).
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(dir) => dir.to_owned(),
        None => ProjectDirs::from("", "", "vanish")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir {}", path.display()))?;
    Ok(path)
}

pub fn db_path(explicit: Option<&Path>) -> Result<PathBuf> {
    Ok(data_dir(explicit)?.join(DB_FILE))
}
