//! Configuration utility functions.

use std::path::{Path, PathBuf};

/// Find config file by searching upward from `start`
///
/// An absolute `config_name` is returned as-is when it exists.
///
/// # Example
/// ```text
/// /home/user/site/wwwroot/css/  ← start
/// /home/user/site/bundle.toml   ← found!
/// ```
pub fn find_config_file(config_name: &Path, start: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.is_file().then(|| config_name.to_path_buf());
    }

    start
        .ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("wwwroot/css");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("bundle.toml"), "").unwrap();

        let found = find_config_file(Path::new("bundle.toml"), &nested).unwrap();
        assert_eq!(found, dir.path().join("bundle.toml"));
    }

    #[test]
    fn test_find_config_file_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            find_config_file(Path::new("no-such-config.toml"), dir.path()),
            None
        );
        let absolute = dir.path().join("bundle.toml");
        assert_eq!(find_config_file(&absolute, dir.path()), None);
    }

    #[test]
    fn test_find_config_file_absolute() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("custom.toml");
        fs::write(&absolute, "").unwrap();
        assert_eq!(
            find_config_file(&absolute, Path::new("/")),
            Some(absolute.clone())
        );
    }
}
