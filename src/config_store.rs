//! Versioned persistence of fitted schema configs.
//!
//! A version is written once. Saving a version that already exists is
//! `ConfigAlreadyExists`; retraining must pick a new version.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::error::{FeatureError, FeatureResult};
use crate::schema_config::SchemaConfig;
use crate::types::ModelVersion;

/// Storage of immutable, versioned schema configs.
pub trait ConfigStore {
    /// Persist `config` under its own version.
    fn save(&self, config: &SchemaConfig) -> FeatureResult<()>;

    /// Load the config stored under `version`.
    ///
    /// Fails with `ConfigNotFound` if nothing is stored and with
    /// `ConfigVersionMismatch` if the stored blob carries another version.
    fn load(&self, version: &ModelVersion) -> FeatureResult<SchemaConfig>;

    /// Versions stored for `city`, oldest first.
    fn versions(&self, city: &str) -> FeatureResult<Vec<ModelVersion>>;

    /// Most recently stored config for `city`.
    fn latest(&self, city: &str) -> FeatureResult<Option<SchemaConfig>> {
        match self.versions(city)?.last() {
            Some(version) => self.load(version).map(Some),
            None => Ok(None),
        }
    }
}

fn checked(config: SchemaConfig, expected: &ModelVersion) -> FeatureResult<SchemaConfig> {
    config.ensure_version(expected)?;
    Ok(config)
}

fn already_exists(version: &ModelVersion) -> FeatureError {
    FeatureError::ConfigAlreadyExists {
        version: version.to_string(),
    }
}

fn not_found(version: &ModelVersion) -> FeatureError {
    FeatureError::ConfigNotFound {
        version: version.to_string(),
    }
}

// ============================================================================
// SQLite Store
// ============================================================================

/// Config store backed by a SQLite table.
pub struct SqliteConfigStore {
    conn: Connection,
}

impl SqliteConfigStore {
    /// Open (or create) the store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> FeatureResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| FeatureError::database(format!("Failed to open database: {}", e)))?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    /// Create a new in-memory store (for testing).
    pub fn in_memory() -> FeatureResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FeatureError::database(format!("Failed to open in-memory db: {}", e)))?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> FeatureResult<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS schema_configs (
                    id INTEGER PRIMARY KEY,
                    city TEXT NOT NULL,
                    version TEXT NOT NULL,
                    blob TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(city, version)
                )",
                [],
            )
            .map_err(|e| {
                FeatureError::database(format!("Failed to create schema_configs table: {}", e))
            })?;
        Ok(())
    }

    /// Creation timestamp of a stored version, RFC 3339.
    pub fn created_at(&self, version: &ModelVersion) -> FeatureResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT created_at FROM schema_configs WHERE city = ?1 AND version = ?2",
                params![version.city, version.version],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| FeatureError::database(format!("Failed to read created_at: {}", e)))
    }
}

impl ConfigStore for SqliteConfigStore {
    fn save(&self, config: &SchemaConfig) -> FeatureResult<()> {
        let version = config.version();
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM schema_configs WHERE city = ?1 AND version = ?2",
                params![version.city, version.version],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(already_exists(version));
        }

        let blob = config.to_json()?;
        self.conn
            .execute(
                "INSERT INTO schema_configs (city, version, blob, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![version.city, version.version, blob, Utc::now().to_rfc3339()],
            )
            .map_err(|e| FeatureError::database(format!("Failed to save config: {}", e)))?;

        info!(%version, "schema config saved");
        Ok(())
    }

    fn load(&self, version: &ModelVersion) -> FeatureResult<SchemaConfig> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT blob FROM schema_configs WHERE city = ?1 AND version = ?2",
                params![version.city, version.version],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| FeatureError::database(format!("Failed to load config: {}", e)))?;

        let blob = blob.ok_or_else(|| not_found(version))?;
        checked(SchemaConfig::from_json(&blob)?, version)
    }

    fn versions(&self, city: &str) -> FeatureResult<Vec<ModelVersion>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_configs WHERE city = ?1 ORDER BY id ASC")
            .map_err(|e| FeatureError::database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![city], |row| row.get::<_, String>(0))
            .map_err(|e| FeatureError::database(format!("Failed to list versions: {}", e)))?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(ModelVersion::new(city, row?));
        }
        Ok(versions)
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Config store writing one JSON file per version into a directory.
///
/// Files are named `category_mappings_<city>_<version>.json`. A city may not
/// contain `_`, so the first `_` after the prefix ends the city. Neither
/// component may contain a path separator or be `.`/`..`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    const PREFIX: &'static str = "category_mappings_";
    const EXTENSION: &'static str = ".json";

    /// Use `dir` as the store, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> FeatureResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| FeatureError::IoError(format!("Failed to create store dir: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, version: &ModelVersion) -> FeatureResult<PathBuf> {
        check_city(&version.city)?;
        check_component("version", &version.version)?;
        Ok(self.dir.join(format!(
            "{}{}_{}{}",
            Self::PREFIX,
            version.city,
            version.version,
            Self::EXTENSION
        )))
    }

    /// Sibling of `path` that `save` writes before linking it into place.
    fn staging_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), stamp))
    }
}

fn check_component(what: &str, value: &str) -> FeatureResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(FeatureError::validation(format!(
            "{} '{}' cannot be used in a file name",
            what, value
        )));
    }
    Ok(())
}

fn check_city(city: &str) -> FeatureResult<()> {
    check_component("city", city)?;
    if city.contains('_') {
        return Err(FeatureError::validation(format!(
            "city '{}' must not contain '_'",
            city
        )));
    }
    Ok(())
}

/// Write `blob` to `staging`, then link it to `path` without replacing an
/// existing file.
fn publish(staging: &Path, path: &Path, blob: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)?;
    file.write_all(blob)?;
    file.sync_all()?;
    drop(file);
    std::fs::hard_link(staging, path)
}

impl ConfigStore for FileConfigStore {
    fn save(&self, config: &SchemaConfig) -> FeatureResult<()> {
        let version = config.version();
        let path = self.path_for(version)?;
        let blob = config.to_json()?;

        let staging = Self::staging_path(&path);
        let published = publish(&staging, &path, blob.as_bytes());
        let _ = std::fs::remove_file(&staging);
        published.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists if path.exists() => already_exists(version),
            _ => FeatureError::IoError(format!("Failed to write {}: {}", path.display(), e)),
        })?;

        info!(%version, path = %path.display(), "schema config saved");
        Ok(())
    }

    fn load(&self, version: &ModelVersion) -> FeatureResult<SchemaConfig> {
        let path = self.path_for(version)?;
        if !path.exists() {
            return Err(not_found(version));
        }
        let blob = std::fs::read_to_string(&path)
            .map_err(|e| FeatureError::IoError(format!("Failed to read config: {}", e)))?;
        checked(SchemaConfig::from_json(&blob)?, version)
    }

    /// Versions ordered by file modification time, then name.
    fn versions(&self, city: &str) -> FeatureResult<Vec<ModelVersion>> {
        check_city(city)?;
        let prefix = format!("{}{}_", Self::PREFIX, city);
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| FeatureError::IoError(format!("Failed to list store: {}", e)))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(version) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(Self::EXTENSION))
            else {
                continue;
            };
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            found.push((modified, version.to_string()));
        }
        found.sort();

        Ok(found
            .into_iter()
            .map(|(_, version)| ModelVersion::new(city, version))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_config::tests::sample_config;
    use crate::schema_config::CategoricalEncoding;

    #[test]
    fn test_sqlite_roundtrip() {
        let store = SqliteConfigStore::in_memory().unwrap();
        let config = sample_config(CategoricalEncoding::OneHot);
        store.save(&config).unwrap();

        let loaded = store.load(config.version()).unwrap();
        assert_eq!(loaded, config);
        assert!(store.created_at(config.version()).unwrap().is_some());
    }

    #[test]
    fn test_sqlite_refuses_overwrite() {
        let store = SqliteConfigStore::in_memory().unwrap();
        let config = sample_config(CategoricalEncoding::OneHot);
        store.save(&config).unwrap();
        let err = store.save(&config).unwrap_err();
        assert!(matches!(err, FeatureError::ConfigAlreadyExists { .. }));
    }

    #[test]
    fn test_sqlite_missing_version() {
        let store = SqliteConfigStore::in_memory().unwrap();
        let err = store.load(&ModelVersion::new("krakow", "9.9")).unwrap_err();
        assert!(matches!(err, FeatureError::ConfigNotFound { .. }));
        assert_eq!(store.latest("krakow").unwrap(), None);
    }

    #[test]
    fn test_sqlite_latest() {
        let store = SqliteConfigStore::in_memory().unwrap();
        let config = sample_config(CategoricalEncoding::OneHot);
        store.save(&config).unwrap();
        assert_eq!(store.versions("krakow").unwrap(), vec![config.version().clone()]);
        assert_eq!(store.latest("krakow").unwrap(), Some(config));
        assert!(store.versions("warszawa").unwrap().is_empty());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();
        let config = sample_config(CategoricalEncoding::Ordinal);
        store.save(&config).unwrap();

        assert!(store
            .path_for(config.version())
            .unwrap()
            .ends_with("category_mappings_krakow_test.json"));
        assert_eq!(store.load(config.version()).unwrap(), config);
        assert_eq!(store.versions("krakow").unwrap(), vec![config.version().clone()]);
    }

    #[test]
    fn test_file_store_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();
        let config = sample_config(CategoricalEncoding::OneHot);
        store.save(&config).unwrap();
        assert!(matches!(
            store.save(&config),
            Err(FeatureError::ConfigAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_file_store_detects_tampered_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();
        let config = sample_config(CategoricalEncoding::OneHot);
        let blob = config.to_json().unwrap();

        let other = ModelVersion::new("krakow", "2.2.0");
        std::fs::write(store.path_for(&other).unwrap(), blob).unwrap();
        let err = store.load(&other).unwrap_err();
        assert!(matches!(err, FeatureError::ConfigVersionMismatch { .. }));
    }

    fn config_for(city: &str, version: &str) -> SchemaConfig {
        let base = sample_config(CategoricalEncoding::OneHot);
        SchemaConfig::new(
            ModelVersion::new(city, version),
            base.encoding(),
            *base.price_bounds(),
            base.build_year_medians().clone(),
            base.building_floors_medians().clone(),
            base.vocabulary().clone(),
        )
    }

    #[test]
    fn test_file_store_keeps_prefix_cities_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();
        let short = config_for("sacz", "1.0");
        let long = config_for("sacz-nowy", "1.0");
        store.save(&short).unwrap();
        store.save(&long).unwrap();

        assert_eq!(store.versions("sacz").unwrap(), vec![short.version().clone()]);
        assert_eq!(store.versions("sacz-nowy").unwrap(), vec![long.version().clone()]);
        assert_eq!(store.latest("sacz").unwrap(), Some(short));
        assert_eq!(store.latest("sacz-nowy").unwrap(), Some(long));
    }

    #[test]
    fn test_file_store_rejects_ambiguous_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("store")).unwrap();

        for (city, version) in [("krakow_x", "1"), ("..", "1"), ("krakow", "../1"), ("krakow", "")] {
            let err = store.save(&config_for(city, version)).unwrap_err();
            assert!(matches!(err, FeatureError::ValidationError(_)), "{city}@{version}");
        }
        assert!(store.versions("krakow_x").is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(dir.path().join("store")).unwrap().count(), 0);
    }

    #[test]
    fn test_file_store_leaves_only_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join(".category_mappings_krakow_test.json.1.2.tmp"), "{").unwrap();

        let config = sample_config(CategoricalEncoding::OneHot);
        store.save(&config).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.ends_with(".tmp"))
            .collect();
        assert_eq!(names, vec!["category_mappings_krakow_test.json"]);
        assert_eq!(store.versions("krakow").unwrap(), vec![config.version().clone()]);
        assert_eq!(store.load(config.version()).unwrap(), config);
    }
}
