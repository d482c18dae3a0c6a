//! Where served files come from and where received files go.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file {0:?} not found")]
    NotFound(String),
    #[error("file name {0:?} is not a plain file name")]
    InvalidName(String),
    #[error("I/O error on {name:?}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

pub trait FileStore {
    fn read(&self, name: &str) -> impl Future<Output = Result<Bytes, StoreError>> + Send;
    fn write(
        &self,
        name: &str,
        contents: &[u8],
    ) -> impl Future<Output = Result<PathBuf, StoreError>> + Send;
}

/// Reject anything but a single path component.
pub fn check_name(name: &str) -> Result<(), StoreError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Serves from one directory and writes downloads into another.
#[derive(Debug, Clone)]
pub struct DirStore {
    serve_dir: PathBuf,
    download_dir: PathBuf,
}

impl DirStore {
    pub fn new(serve_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            serve_dir: serve_dir.into(),
            download_dir: download_dir.into(),
        }
    }
}

impl FileStore for DirStore {
    async fn read(&self, name: &str) -> Result<Bytes, StoreError> {
        check_name(name)?;
        match fs::read(self.serve_dir.join(name)).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(source) => Err(StoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf, StoreError> {
        check_name(name)?;
        let io_err = |source| StoreError::Io {
            name: name.to_string(),
            source,
        };
        fs::create_dir_all(&self.download_dir).await.map_err(io_err)?;
        let path = self.download_dir.join(name);
        fs::write(&path, contents).await.map_err(io_err)?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("myftp-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
