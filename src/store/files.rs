//! Local file storage
//!
//! Bytes live on disk under `file_storage_path/<file_id>`, metadata in the
//! `files` table. Storage addresses files by `file_id` only; sandbox paths
//! are recorded on the session's FileInfo, not here.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

use super::parse_ts;
use crate::error::{Error, Result};
use crate::models::FileInfo;

#[derive(Clone)]
pub struct FileStorage {
    pool: SqlitePool,
    root: PathBuf,
}

impl FileStorage {
    pub fn new(pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            root: root.into(),
        }
    }

    fn blob_path(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }

    pub async fn upload_file(
        &self,
        data: Vec<u8>,
        filename: &str,
        user_id: &str,
    ) -> Result<FileInfo> {
        let file_id = uuid::Uuid::new_v4().simple().to_string();
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.blob_path(&file_id), &data).await?;

        let info = FileInfo {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            file_path: None,
            size: data.len() as u64,
            content_type: content_type_for(filename),
            upload_date: Some(Utc::now()),
            user_id: user_id.to_string(),
            metadata: serde_json::Map::new(),
        };

        sqlx::query(
            r#"
            INSERT INTO files (
                file_id, filename, file_path, size, content_type, upload_date,
                user_id, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&info.file_id)
        .bind(&info.filename)
        .bind(&info.file_path)
        .bind(info.size as i64)
        .bind(&info.content_type)
        .bind(info.upload_date.map(|ts| ts.to_rfc3339()))
        .bind(&info.user_id)
        .bind(serde_json::to_string(&info.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(info)
    }

    pub async fn download_file(&self, file_id: &str, user_id: &str) -> Result<(Vec<u8>, FileInfo)> {
        let info = self
            .get_file_info(file_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("File {file_id} not found")))?;
        let data = tokio::fs::read(self.blob_path(file_id)).await?;
        Ok((data, info))
    }

    pub async fn get_file_info(&self, file_id: &str, user_id: &str) -> Result<Option<FileInfo>> {
        let row = sqlx::query("SELECT * FROM files WHERE file_id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(FileInfo {
            file_id: row.get("file_id"),
            filename: row.get("filename"),
            file_path: row.get("file_path"),
            size: row.get::<i64, _>("size") as u64,
            content_type: row.get("content_type"),
            upload_date: parse_ts(row.get("upload_date")),
            user_id: row.get("user_id"),
            metadata: serde_json::from_str(&row.get::<String, _>("metadata_json"))
                .unwrap_or_default(),
        }))
    }

    /// Remove metadata and the on-disk blob. Missing blobs are tolerated.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        let _ = tokio::fs::remove_file(self.blob_path(file_id)).await;
        Ok(())
    }
}

fn content_type_for(filename: &str) -> Option<String> {
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())?;
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => return Some("application/octet-stream".to_string()),
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("report.md").as_deref(), Some("text/markdown"));
        assert_eq!(content_type_for("shot.PNG").as_deref(), Some("image/png"));
        assert_eq!(
            content_type_for("archive.bin").as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(content_type_for("noext"), None);
    }
}
