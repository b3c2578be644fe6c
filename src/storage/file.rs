//! 追加日志文件存储后端
//!
//! 每行一个 JSON 对象，字段为 `uuid`、`short_url`、`original_url`、`userid`、
//! `deleted`。写入只追加；删除时读出整个文件、翻转 `deleted` 标记，
//! 写入同目录临时文件并 fsync 后原子 rename 覆盖原文件。
//!
//! 读写都线性扫描整个文件。所有操作在同一把互斥锁下完成。

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::models::{BatchItem, BatchResult, DeleteRequest, Record, UserLink};
use super::{OpContext, StorageEngine, apply_batch, normalize_key};
use crate::errors::{Result, ShorterError};
use crate::utils::{derive_key, normalize_url};

/// 日志文件中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRow {
    #[serde(rename = "uuid")]
    id: String,
    short_url: String,
    original_url: String,
    #[serde(rename = "userid")]
    user_id: String,
    #[serde(default)]
    deleted: bool,
}

impl From<LogRow> for Record {
    fn from(row: LogRow) -> Self {
        Record {
            sequence_id: row.id.parse().unwrap_or_default(),
            short_key: row.short_url,
            original_url: row.original_url,
            owner_id: row.user_id,
            deleted: row.deleted,
        }
    }
}

impl From<&Record> for LogRow {
    fn from(record: &Record) -> Self {
        LogRow {
            id: record.sequence_id.to_string(),
            short_url: record.short_key.clone(),
            original_url: record.original_url.clone(),
            user_id: record.owner_id.clone(),
            deleted: record.deleted,
        }
    }
}

struct LogState {
    /// 追加写句柄，`None` 表示已关闭
    file: Option<File>,
    /// 已分配的最大序号
    last_sequence: u64,
}

impl LogState {
    fn writer(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| ShorterError::backend_unavailable("file storage is closed"))
    }
}

pub struct LogStore {
    path: PathBuf,
    state: Mutex<LogState>,
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            ShorterError::backend_unavailable(format!(
                "failed to open storage file {}: {}",
                path.display(),
                e
            ))
        })
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ShorterError::backend_unavailable(format!(
            "failed to read storage file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

impl LogStore {
    /// 打开（不存在则创建）日志文件，必要时创建父目录
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(ShorterError::config("file storage path is empty"));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ShorterError::backend_unavailable(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = open_append(&path)?;
        let existing = read_lines(&path)?.len() as u64;

        info!(
            "File storage initialized at {} with {} records",
            path.display(),
            existing
        );
        Ok(Self {
            path,
            state: Mutex::new(LogState {
                file: Some(file),
                last_sequence: existing,
            }),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// 解析所有记录，跳过无法解析的行
    fn read_records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for (index, line) in read_lines(&self.path)?.into_iter().enumerate() {
            match serde_json::from_str::<LogRow>(&line) {
                Ok(row) => records.push(Record::from(row)),
                Err(e) => warn!(
                    "File storage: skipping malformed line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    fn insert(&self, state: &mut LogState, url: &str, owner_id: &str) -> Result<String> {
        let normalized = normalize_url(url);
        let key = derive_key(&normalized);
        if key.is_empty() {
            return Err(ShorterError::invalid_input(format!(
                "cannot derive a key from URL: {:?}",
                url
            )));
        }

        if let Some(existing) = self
            .read_records()?
            .into_iter()
            .find(|r| r.short_key == key || r.original_url == normalized)
        {
            return Err(ShorterError::already_exists(
                existing.short_key,
                format!("URL already stored: {}", existing.original_url),
            ));
        }

        let record = Record {
            sequence_id: state.last_sequence + 1,
            short_key: key.clone(),
            original_url: normalized,
            owner_id: owner_id.to_string(),
            deleted: false,
        };
        let mut line = serde_json::to_string(&LogRow::from(&record))?;
        line.push('\n');

        state.writer()?.write_all(line.as_bytes())?;
        state.last_sequence = record.sequence_id;
        debug!("File storage: appended key {}", key);
        Ok(key)
    }

    /// 先写临时文件再 rename，崩溃时原文件保持完整
    fn rewrite(&self, state: &mut LogState, lines: &[String]) -> Result<()> {
        let temp_path = self.temp_path();
        {
            let mut temp = File::create(&temp_path)?;
            for line in lines {
                temp.write_all(line.as_bytes())?;
                temp.write_all(b"\n")?;
            }
            temp.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        // 旧句柄仍指向被替换掉的文件
        state.file = None;
        state.file = Some(open_append(&self.path)?);
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for LogStore {
    async fn set(&self, ctx: &OpContext, url: &str, owner_id: &str) -> Result<String> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.writer()?;
        self.insert(&mut state, url, owner_id)
    }

    async fn set_batch(
        &self,
        ctx: &OpContext,
        items: &[BatchItem],
        owner_id: &str,
    ) -> Result<Vec<BatchResult>> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.writer()?;
        apply_batch(items, |url| self.insert(&mut state, url, owner_id))
    }

    async fn get(&self, ctx: &OpContext, key: &str) -> Result<String> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.writer()?;

        let key = normalize_key(key);
        if key.is_empty() {
            return Err(ShorterError::not_found("empty key"));
        }
        match self.read_records()?.into_iter().find(|r| r.short_key == key) {
            None => Err(ShorterError::not_found(format!("no record for key: {}", key))),
            Some(record) if record.deleted => Err(ShorterError::deleted(format!(
                "record for key {} is deleted",
                key
            ))),
            Some(record) => Ok(record.original_url),
        }
    }

    async fn get_user_urls(&self, ctx: &OpContext, owner_id: &str) -> Result<Vec<UserLink>> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.writer()?;

        if owner_id.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .read_records()?
            .iter()
            .filter(|r| !r.deleted && r.owner_id == owner_id)
            .map(UserLink::from)
            .collect())
    }

    async fn delete_batch(&self, ctx: &OpContext, items: &[DeleteRequest]) -> Result<bool> {
        ctx.check()?;
        if items.is_empty() {
            return Err(ShorterError::invalid_input("no keys provided for deletion"));
        }

        let mut state = self.state.lock();
        state.writer()?;

        let mut targets: HashMap<&str, HashSet<String>> = HashMap::new();
        for item in items {
            targets
                .entry(item.owner_id.as_str())
                .or_default()
                .extend(item.keys.iter().map(|k| normalize_key(k)));
        }

        let mut changed = 0usize;
        let mut updated = Vec::new();
        for line in read_lines(&self.path)? {
            let Ok(row) = serde_json::from_str::<LogRow>(&line) else {
                // 无法解析的行原样保留
                updated.push(line);
                continue;
            };
            let mut record = Record::from(row);
            let matched = !record.owner_id.is_empty()
                && targets
                    .get(record.owner_id.as_str())
                    .is_some_and(|keys| keys.contains(&record.short_key));
            if matched && !record.deleted {
                record.deleted = true;
                changed += 1;
                updated.push(serde_json::to_string(&LogRow::from(&record))?);
            } else {
                updated.push(line);
            }
        }

        if changed > 0 {
            self.rewrite(&mut state, &updated)?;
        }
        debug!("File storage: soft-deleted {} records", changed);
        Ok(changed > 0)
    }

    async fn is_available(&self) -> bool {
        self.state.lock().file.is_some()
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            file.sync_all()?;
            info!("File storage closed: {}", self.path.display());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_row_uses_wire_field_names() {
        let record = Record {
            sequence_id: 3,
            short_key: "4b23".to_string(),
            original_url: "http://www.test.com/".to_string(),
            owner_id: "owner".to_string(),
            deleted: false,
        };
        let json = serde_json::to_string(&LogRow::from(&record)).unwrap();
        assert_eq!(
            json,
            r#"{"uuid":"3","short_url":"4b23","original_url":"http://www.test.com/","userid":"owner","deleted":false}"#
        );
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path().join("data.txt")).unwrap();
        assert_eq!(store.temp_path(), dir.path().join("data.txt.tmp"));
    }

    #[test]
    fn test_open_counts_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(
            &path,
            concat!(
                r#"{"uuid":"1","short_url":"61","original_url":"a","userid":"","deleted":false}"#,
                "\n",
                r#"{"uuid":"2","short_url":"62","original_url":"b","userid":"","deleted":false}"#,
                "\n"
            ),
        )
        .unwrap();

        let store = LogStore::open(&path).unwrap();
        assert_eq!(store.state.lock().last_sequence, 2);
    }
}
