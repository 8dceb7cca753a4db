//! Data directory layout.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "COURIER_DATA_DIR";

/// Resolve the data directory: `COURIER_DATA_DIR` if set, else `~/.courier`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".courier");
    }

    PathBuf::from(".courier")
}

/// `{data_dir}/courier.db`
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("courier.db")
}

/// sqlx connection URL for the database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", database_path(data_dir).display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_lives_in_data_dir() {
        let dir = Path::new("/tmp/courier-test");
        assert_eq!(database_path(dir), dir.join("courier.db"));
        let url = database_url(dir);
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("courier.db?mode=rwc"));
    }

    #[test]
    fn resolved_dir_is_not_empty() {
        assert!(!resolve_data_dir().as_os_str().is_empty());
    }
}
