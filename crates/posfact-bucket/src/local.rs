use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::{BucketError, BucketStore};

/// A directory on local disk standing in for a bucket. Keys map to paths
/// relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalBucketStore {
    root: PathBuf,
    bucket: String,
}

impl LocalBucketStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Result<Self, BucketError> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(BucketError::Configuration(
                "bucket name cannot be empty".into(),
            ));
        }
        Ok(Self {
            root: root.into(),
            bucket,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BucketError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(BucketError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn map_io(key: &str, err: std::io::Error) -> BucketError {
        if err.kind() == ErrorKind::NotFound {
            BucketError::NotFound(key.to_string())
        } else {
            BucketError::Io(err)
        }
    }
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn uri_scheme(&self) -> &'static str {
        "file"
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BucketError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        let path = self.path_for(key)?;
        let contents = fs::read(&path).await.map_err(|err| Self::map_io(key, err))?;
        Ok(Bytes::from(contents))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BucketError::Io(err)),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(BucketError::Io(err)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn object_exists(&self, key: &str) -> Result<bool, BucketError> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn promote_object(&self, from: &str, to: &str) -> Result<(), BucketError> {
        let source = self.path_for(from)?;
        let target = self.path_for(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target)
            .await
            .map_err(|err| Self::map_io(from, err))
    }
}
