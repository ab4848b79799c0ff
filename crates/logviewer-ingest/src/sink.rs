//! Upload staging
//!
//! [`FileSink`] copies an incoming byte stream into the staging directory and
//! queues it on the [`Broker`]. The stream is written to a `.partial` file
//! first and renamed once complete, so a crash mid-upload never leaves a
//! truncated file that recovery would mistake for a finished one.

use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, PARTIAL_SUFFIX};
use crate::error::SinkError;

pub struct FileSink {
    broker: Broker,
    extension: String,
}

impl FileSink {
    /// Stage uploads in the broker's staging directory as `<task_id>.<extension>`.
    pub fn new(broker: Broker, extension: impl Into<String>) -> Self {
        Self {
            broker,
            extension: extension.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        self.broker.staging_dir()
    }

    /// Stage `stream` and queue it for processing, returning the task id.
    ///
    /// The payload is streamed to disk, never held in memory as a whole. On a
    /// write failure the partial file is removed and [`SinkError::Write`] is
    /// returned. If the queue is full the staged file is removed again and
    /// the broker's [`SinkError::CapacityExceeded`] is passed through.
    pub async fn submit<R>(&self, mut stream: R) -> Result<String, SinkError>
    where
        R: AsyncRead + Unpin,
    {
        let task_id = Uuid::new_v4().to_string();
        let path = self
            .staging_dir()
            .join(format!("{}.{}", task_id, self.extension));
        let partial = partial_path(&path);

        if let Err(source) = self.stage(&mut stream, &partial, &path).await {
            error!(task_id = %task_id, error = %source, "Error streaming file");
            remove_quietly(&partial).await;
            remove_quietly(&path).await;
            return Err(SinkError::Write { path, source });
        }

        if let Err(err) = self.broker.publish(path.clone(), task_id.clone(), false) {
            warn!(task_id = %task_id, "Upload rejected: {}", err);
            remove_quietly(&path).await;
            return Err(err.into());
        }

        Ok(task_id)
    }

    async fn stage<R>(&self, stream: &mut R, partial: &Path, path: &Path) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        fs::create_dir_all(self.staging_dir()).await?;

        let mut file = File::create(partial).await?;
        let bytes = tokio::io::copy(stream, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(partial, path).await?;
        info!(path = %path.display(), bytes, "File upload completed");
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {},
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
        Err(err) => error!(path = %path.display(), error = %err, "Failed to remove staging file"),
    }
}
