use std::fmt;

/// 存储核心的统一错误类型
///
/// 各后端返回的错误原样透传给调用方，由调用方决定如何映射到传输层状态码。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShorterError {
    /// URL 为空或无法解析
    InvalidInput(String),
    /// 幂等冲突，携带已存在的短 key
    AlreadyExists { key: String, message: String },
    NotFound(String),
    /// 记录存在但已被软删除
    Deleted(String),
    /// I/O 或连接故障
    BackendUnavailable(String),
    /// 序列化、事务或其他意外故障
    Internal(String),
    /// 操作开始前已被取消或超过截止时间
    Cancelled(String),
    Config(String),
}

impl ShorterError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ShorterError::InvalidInput(_) => "E001",
            ShorterError::AlreadyExists { .. } => "E002",
            ShorterError::NotFound(_) => "E003",
            ShorterError::Deleted(_) => "E004",
            ShorterError::BackendUnavailable(_) => "E005",
            ShorterError::Internal(_) => "E006",
            ShorterError::Cancelled(_) => "E007",
            ShorterError::Config(_) => "E008",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ShorterError::InvalidInput(_) => "Invalid Input",
            ShorterError::AlreadyExists { .. } => "Already Exists",
            ShorterError::NotFound(_) => "Not Found",
            ShorterError::Deleted(_) => "Deleted",
            ShorterError::BackendUnavailable(_) => "Backend Unavailable",
            ShorterError::Internal(_) => "Internal Error",
            ShorterError::Cancelled(_) => "Cancelled",
            ShorterError::Config(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ShorterError::InvalidInput(msg) => msg,
            ShorterError::AlreadyExists { message, .. } => message,
            ShorterError::NotFound(msg) => msg,
            ShorterError::Deleted(msg) => msg,
            ShorterError::BackendUnavailable(msg) => msg,
            ShorterError::Internal(msg) => msg,
            ShorterError::Cancelled(msg) => msg,
            ShorterError::Config(msg) => msg,
        }
    }

    /// `AlreadyExists` 时返回已存在记录的 key
    pub fn existing_key(&self) -> Option<&str> {
        match self {
            ShorterError::AlreadyExists { key, .. } => Some(key),
            _ => None,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ShorterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ShorterError {}

// 便捷的构造函数
impl ShorterError {
    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        ShorterError::InvalidInput(msg.into())
    }

    pub fn already_exists<K: Into<String>, T: Into<String>>(key: K, msg: T) -> Self {
        ShorterError::AlreadyExists {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ShorterError::NotFound(msg.into())
    }

    pub fn deleted<T: Into<String>>(msg: T) -> Self {
        ShorterError::Deleted(msg.into())
    }

    pub fn backend_unavailable<T: Into<String>>(msg: T) -> Self {
        ShorterError::BackendUnavailable(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ShorterError::Internal(msg.into())
    }

    pub fn cancelled<T: Into<String>>(msg: T) -> Self {
        ShorterError::Cancelled(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ShorterError::Config(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for ShorterError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::{DbErr, SqlErr};

        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            // 调用方知道冲突的 key 时会覆盖这里的空 key
            return ShorterError::already_exists("", msg);
        }
        match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                ShorterError::BackendUnavailable(err.to_string())
            }
            DbErr::Exec(_) | DbErr::Query(_) if is_lock_contention(&err) => {
                ShorterError::BackendUnavailable(err.to_string())
            }
            other => ShorterError::Internal(other.to_string()),
        }
    }
}

/// 死锁、锁等待超时、SQLite busy 等可以重试的执行错误
fn is_lock_contention(err: &sea_orm::DbErr) -> bool {
    let msg = err.to_string().to_lowercase();
    ["deadlock", "lock wait timeout", "database is locked", "serialization failure"]
        .iter()
        .any(|pattern| msg.contains(pattern))
}

impl From<std::io::Error> for ShorterError {
    fn from(err: std::io::Error) -> Self {
        ShorterError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ShorterError {
    fn from(err: serde_json::Error) -> Self {
        ShorterError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for ShorterError {
    fn from(err: config::ConfigError) -> Self {
        ShorterError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShorterError>;
