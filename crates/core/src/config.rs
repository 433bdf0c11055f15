//! Mirroring configuration (`treemirror.toml`) and its validation

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::Semaphore;

/// Default number of filesystem operations in flight at once
pub const DEFAULT_JOBS: usize = 16;

/// Unvalidated configuration, as read from a file and/or the command line
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Folder treated as ground truth
    pub source: PathBuf,
    /// Folder made identical to the source
    pub replica: PathBuf,
    /// Where synchronization events are logged
    pub log_file: PathBuf,
    /// Seconds between the start of two passes
    pub interval: i64,
    /// Maximum concurrent filesystem operations
    pub jobs: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("source"),
            replica: PathBuf::from("replica"),
            log_file: PathBuf::from("log.txt"),
            interval: 5,
            jobs: DEFAULT_JOBS,
        }
    }
}

/// Validated configuration; source and replica are absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub log_file: PathBuf,
    pub interval: Duration,
    pub jobs: NonZeroUsize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl MirrorConfig {
    /// Load config from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every setting, creating the replica and log folders if they are
    /// missing.
    ///
    /// # Errors
    /// Returns one human-readable message per problem found.
    pub fn validate(&self) -> Result<Settings, Vec<String>> {
        let mut errors = Vec::new();

        if !self.source.is_dir() {
            errors.push(format!(
                "Source folder {:?} does not exist.",
                self.source.display().to_string()
            ));
        }

        if !self.replica.is_dir() && std::fs::create_dir_all(&self.replica).is_err() {
            errors.push(format!(
                "Replica folder {:?} does not exist and could not be created.",
                self.replica.display().to_string()
            ));
        }

        let canonical = self.source.canonicalize().ok().zip(self.replica.canonicalize().ok());
        if let Some((source, replica)) = &canonical {
            if source == replica {
                errors.push("Replica folder can not be the same as the source folder.".to_string());
            } else if replica.starts_with(source) {
                errors.push("Replica folder can not be inside the source folder.".to_string());
            } else if source.starts_with(replica) {
                errors.push("Source folder can not be inside the replica folder.".to_string());
            }
        }

        if self.interval <= 0 {
            errors.push(format!(
                "Seconds between sync must be greater than zero, current value is {}.",
                self.interval
            ));
        }

        if let Some(folder) = self.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !folder.is_dir() && std::fs::create_dir_all(folder).is_err() {
                errors.push(format!(
                    "Folder {:?} for log-file {:?} can not be created.",
                    folder.display().to_string(),
                    self.log_file.display().to_string()
                ));
            }
        }

        let jobs = NonZeroUsize::new(self.jobs).filter(|j| j.get() <= Semaphore::MAX_PERMITS);
        if self.jobs == 0 {
            errors.push("Number of concurrent jobs must be greater than zero.".to_string());
        } else if self.jobs > Semaphore::MAX_PERMITS {
            errors.push(format!(
                "Number of concurrent jobs can not exceed {}, current value is {}.",
                Semaphore::MAX_PERMITS,
                self.jobs
            ));
        }

        match (errors.is_empty(), jobs) {
            (true, Some(jobs)) => {
                let (source, replica) =
                    canonical.unwrap_or_else(|| (self.source.clone(), self.replica.clone()));
                Ok(Settings {
                    source,
                    replica,
                    log_file: self.log_file.clone(),
                    interval: Duration::from_secs(self.interval.unsigned_abs()),
                    jobs,
                })
            }
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> MirrorConfig {
        std::fs::create_dir(dir.join("source")).unwrap();
        MirrorConfig {
            source: dir.join("source"),
            replica: dir.join("replica"),
            log_file: dir.join("logs/sync.log"),
            ..MirrorConfig::default()
        }
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
source = "/data/in"
replica = "/backup/out"
log_file = "/var/log/treemirror.log"
interval = 30
jobs = 4
"#;

        let config: MirrorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.source, PathBuf::from("/data/in"));
        assert_eq!(config.replica, PathBuf::from("/backup/out"));
        assert_eq!(config.interval, 30);
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: MirrorConfig = toml::from_str("").unwrap();
        assert_eq!(config, MirrorConfig::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<MirrorConfig>("sauce = \"typo\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("treemirror.toml");
        std::fs::write(&path, "interval = 12\n").unwrap();

        let config = MirrorConfig::load(&path).unwrap();
        assert_eq!(config.interval, 12);
        assert_eq!(config.replica, PathBuf::from("replica"));

        assert!(matches!(
            MirrorConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_creates_replica_and_log_folder() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());

        let settings = config.validate().unwrap();
        assert!(dir.path().join("replica").is_dir());
        assert!(dir.path().join("logs").is_dir());
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.jobs.get(), DEFAULT_JOBS);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let dir = TempDir::new().unwrap();
        let config = MirrorConfig {
            source: dir.path().join("nope"),
            replica: dir.path().join("replica"),
            log_file: dir.path().join("log.txt"),
            interval: 0,
            jobs: 0,
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors[0].starts_with("Source folder"));
        assert!(errors[1].contains("current value is 0"));
        assert!(errors[2].contains("concurrent jobs"));
    }

    #[test]
    fn test_validate_rejects_same_folder() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.replica = dir.path().join("source/.");

        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec!["Replica folder can not be the same as the source folder.".to_string()]
        );
    }

    #[test]
    fn test_validate_rejects_nesting() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.replica = dir.path().join("source/mirror");
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("inside the source"), "{errors:?}");

        let mut config = config_in(&dir.path().join("source/mirror"));
        config.replica = dir.path().join("source");
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("inside the replica"), "{errors:?}");
    }

    #[test]
    fn test_validate_rejects_oversized_jobs() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.jobs = usize::MAX;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].starts_with("Number of concurrent jobs can not exceed"));

        config.jobs = Semaphore::MAX_PERMITS;
        assert_eq!(config.validate().unwrap().jobs.get(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_validate_negative_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.interval = -3;

        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec!["Seconds between sync must be greater than zero, current value is -3.".to_string()]
        );
    }
}
