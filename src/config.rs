//! Application configuration module / 애플리케이션 설정 모듈
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 첫 실행 시 기본 설정 파일 생성

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::search::schema::SearchOptions;

/// Global configuration instance / 전역 설정 인스턴스
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 애플리케이션 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Index cache configuration / 캐시 설정
    pub cache: CacheConfig,
    /// Search configuration / 검색 설정
    pub search: SearchConfig,
    /// Import configuration / 가져오기 설정
    pub import: ImportConfig,
}

/// Index cache configuration / 캐시 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the SQLite cache at all / 캐시 사용 여부
    pub enabled: bool,
    /// Data directory path / 데이터 디렉터리
    pub data_dir: String,
    /// Cache database file (relative to data_dir) / 캐시 DB 파일
    pub db_file: String,
}

/// Search configuration / 검색 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fuzzy cutoff, 0.0 ~ 1.0 / 최소 유사도
    pub min_similarity: f64,
    /// Maximum rows per search / 최대 결과 수
    pub max_results: usize,
    /// Fuzzy vocabulary candidates per keyword / 퍼지 후보 수
    pub fuzzy_candidate_limit: usize,
}

/// Import configuration / 가져오기 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows per batch read from a file / 배치 크기
    pub batch_size: usize,
    /// File extensions picked up from directories / 지원 확장자
    pub supported_extensions: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: "data".to_string(),
            db_file: "scavenger_cache.db".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.6,
            max_results: 500,
            fuzzy_candidate_limit: 50,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            supported_extensions: vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()],
        }
    }
}

impl AppConfig {
    /// Get the full data directory path / 데이터 디렉터리 경로
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache.data_dir)
    }

    /// Get the full cache database path / 캐시 DB 경로
    pub fn get_cache_db_path(&self) -> PathBuf {
        self.get_data_dir().join(&self.cache.db_file)
    }

    /// Search options for a query with the configured defaults
    pub fn search_options(&self, query: impl Into<String>) -> SearchOptions {
        SearchOptions::new(query)
            .with_min_similarity(self.search.min_similarity.clamp(0.0, 1.0))
            .with_limit(self.search.max_results)
            .with_fuzzy_candidates(self.search.fuzzy_candidate_limit)
    }
}

/// Get the config file path / 설정 파일 경로
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 설정 로드, 없으면 기본값 생성
pub fn load_config() -> Result<AppConfig, String> {
    load_config_from(&get_config_path())
}

/// Load configuration from a specific file / 지정 파일에서 설정 로드
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 설정 저장
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    save_config_to(config, &get_config_path())
}

fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 전역 설정 초기화
pub fn init_config() -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config()?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG
        .set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 전역 설정 인스턴스
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG
        .get_or_init(|| {
            let config = load_config().unwrap_or_default();
            Arc::new(RwLock::new(config))
        })
        .clone()
}

/// Get a read-only snapshot of current config / 현재 설정 스냅샷
pub fn config() -> AppConfig {
    get_config().read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_file_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.get_cache_db_path(), PathBuf::from("data").join("scavenger_cache.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search": {"max_results": 20}, "cache": {"enabled": false}}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.search.max_results, 20);
        assert_eq!(config.search.min_similarity, 0.6);
        assert!(!config.cache.enabled);
        assert_eq!(config.import.batch_size, 10_000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_search_options_from_config() {
        let mut config = AppConfig::default();
        config.search.min_similarity = 1.7;
        config.search.fuzzy_candidate_limit = 5;
        let options = config.search_options("서울");
        assert_eq!(options.query, "서울");
        assert_eq!(options.min_similarity, 1.0);
        assert_eq!(options.fuzzy_candidates, 5);
        assert_eq!(options.limit, 500);
    }
}
