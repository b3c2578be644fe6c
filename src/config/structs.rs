use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::errors::{Result, ShorterError};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 存储后端类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    Memory,
    File,
    Database,
}

/// 删除队列的消费策略
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeletionPolicyKind {
    /// 每个请求单独执行一次删除
    Immediate,
    /// 按固定时间窗口合并后执行
    #[default]
    Windowed,
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > 配置文件 > 默认值
    /// ENV 前缀：SHORTER，分隔符：__
    /// 示例：SHORTER__DATABASE__DSN=sqlite://links.db
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = Self::from_sources(path)?;
        config.validate()?;
        Ok(config)
    }

    /// 合并文件和环境变量，不做校验
    ///
    /// 调用方在叠加命令行覆盖之后再调用 [`AppConfig::validate`]。
    pub fn from_sources(path: Option<&str>) -> Result<Self> {
        use config::{Config, Environment, File};

        // 显式指定的配置文件必须存在
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (DEFAULT_CONFIG_PATH, false),
        };

        let settings = Config::builder()
            // 1. 从 TOML 文件加载
            .add_source(File::with_name(path).required(required))
            // 2. 从环境变量覆盖
            .add_source(
                Environment::with_prefix("SHORTER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<()> {
        if self.deletion.queue_capacity == 0 {
            return Err(ShorterError::config("deletion.queue_capacity must be > 0"));
        }
        if self.deletion.policy == DeletionPolicyKind::Windowed && self.deletion.window_secs == 0 {
            return Err(ShorterError::config(
                "deletion.window_secs must be > 0 for the windowed policy",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ShorterError::config("database.max_connections must be > 0"));
        }
        if self.storage.backend == Some(BackendKind::Database) && self.database.dsn.trim().is_empty()
        {
            return Err(ShorterError::config(
                "storage.backend = \"database\" requires database.dsn",
            ));
        }
        if self.storage.backend == Some(BackendKind::File)
            && self.storage.file_storage_path.trim().is_empty()
        {
            return Err(ShorterError::config(
                "storage.backend = \"file\" requires storage.file_storage_path",
            ));
        }
        Ok(())
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("# Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ShorterError::config(format!("failed to render config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 不设置时按 DSN、文件路径的顺序推断
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub file_storage_path: String,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 删除协调器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub policy: DeletionPolicyKind,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_max_connections() -> u32 {
    25
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_lifetime_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_queue_capacity() -> usize {
    100
}

fn default_window_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            max_lifetime_secs: default_max_lifetime_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            policy: DeletionPolicyKind::default(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}
