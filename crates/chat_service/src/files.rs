//! File upload handling.
//!
//! Incoming attachments are either inline base64 payloads or hashes of
//! blobs the store already holds. Base64 payloads are size-checked,
//! decoded and uploaded before the turn proceeds, so a message only ever
//! references files by content hash.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use conversation_tree::{FileKind, MessageFile};
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use crate::config::UsageLimits;
use crate::dto::FileInput;
use crate::error::{AppError, Result};

/// External file collaborator: stores a blob, returns its sha256 hex.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(
        &self,
        conversation_id: Uuid,
        name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<String>;
}

/// Content-addressed blobs on disk, grouped by conversation.
pub struct DiskFileStore {
    base_path: PathBuf,
}

impl DiskFileStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn store(
        &self,
        conversation_id: Uuid,
        name: &str,
        _mime: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let sha = hex::encode(Sha256::digest(bytes));
        let dir = self.base_path.join("files").join(conversation_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        fs::write(dir.join(&sha), bytes)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        tracing::debug!(
            conversation_id = %conversation_id,
            name = %name,
            sha = %sha,
            size = bytes.len(),
            "stored uploaded file"
        );
        Ok(sha)
    }
}

/// Normalize the request's attachments into hash-form [`MessageFile`]s,
/// uploading inline payloads. Runs before any tree mutation; limit
/// violations abort the turn synchronously.
pub async fn resolve_input_files(
    store: &dyn FileStore,
    conversation_id: Uuid,
    inputs: &[FileInput],
    limits: &UsageLimits,
) -> Result<Vec<MessageFile>> {
    if inputs.len() > limits.max_files {
        return Err(AppError::BadRequest(format!(
            "Too many files, at most {} allowed",
            limits.max_files
        )));
    }

    let mut resolved = Vec::with_capacity(inputs.len());
    for input in inputs {
        match input.kind {
            FileKind::Hash => resolved.push(MessageFile {
                kind: FileKind::Hash,
                name: input.name.clone(),
                value: input.value.clone(),
                mime: input.mime.clone(),
            }),
            FileKind::Base64 => {
                let bytes = BASE64
                    .decode(input.value.as_bytes())
                    .map_err(|e| AppError::BadRequest(format!("Invalid file encoding: {e}")))?;
                if bytes.len() > limits.max_file_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File too large, should be <{} bytes",
                        limits.max_file_bytes
                    )));
                }
                let sha = store
                    .store(conversation_id, &input.name, &input.mime, &bytes)
                    .await?;
                resolved.push(MessageFile {
                    kind: FileKind::Hash,
                    name: input.name.clone(),
                    value: sha,
                    mime: input.mime.clone(),
                });
            }
        }
    }
    Ok(resolved)
}
