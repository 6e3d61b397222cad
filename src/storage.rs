//! コンテンツストレージ
//!
//! `Storage` はバイナリと JSON をアップロードして URI を返すだけの窓口。
//! 実装はメモリ上のモックとローカルディレクトリの2種類。

use crate::asset::Asset;
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub const MOCK_STORAGE_BASE: &str = "https://mockstorage.example.com";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("network error: {0}")]
    Network(String),
    #[error("storage quota exceeded")]
    Quota,
    #[error("storage returned an empty URI")]
    EmptyUri,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// バイナリをアップロードして URI を返す
    async fn upload(&self, asset: &Asset, unique_name: &str) -> Result<String, StorageError>;

    /// JSON オブジェクトをアップロードして URI を返す
    async fn upload_json(&self, document: &serde_json::Value) -> Result<String, StorageError>;
}

fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// メモリ上に保持するだけのストレージ
#[derive(Debug, Default)]
pub struct MockStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, object: StoredObject) -> Result<String, StorageError> {
        let uri = format!("{}/{}", MOCK_STORAGE_BASE, random_id());
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::Network("mock storage lock poisoned".into()))?;
        objects.insert(uri.clone(), object);
        Ok(uri)
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn upload(&self, asset: &Asset, unique_name: &str) -> Result<String, StorageError> {
        let uri = self.put(StoredObject {
            name: unique_name.to_string(),
            content_type: asset.mime().to_string(),
            bytes: asset.bytes().to_vec(),
        })?;
        debug!(%uri, name = unique_name, "stored asset in mock storage");
        Ok(uri)
    }

    async fn upload_json(&self, document: &serde_json::Value) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec(document)?;
        let uri = self.put(StoredObject {
            name: format!("{}.json", random_id()),
            content_type: "application/json".to_string(),
            bytes,
        })?;
        debug!(%uri, "stored JSON in mock storage");
        Ok(uri)
    }
}

/// ローカルディレクトリに書き出すストレージ。URI は `file://`
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let root = tokio::fs::canonicalize(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        // アップロード名にパス区切りが混ざっても root の外には書かない
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let path = self.root.join(safe);
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}

#[async_trait]
impl Storage for DirStorage {
    async fn upload(&self, asset: &Asset, unique_name: &str) -> Result<String, StorageError> {
        let uri = self.write(unique_name, asset.bytes()).await?;
        debug!(%uri, "wrote asset to directory storage");
        Ok(uri)
    }

    async fn upload_json(&self, document: &serde_json::Value) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let name = format!("{}-{}.json", chrono::Utc::now().timestamp_millis(), random_id());
        let uri = self.write(&name, &bytes).await?;
        debug!(%uri, "wrote JSON to directory storage");
        Ok(uri)
    }
}
