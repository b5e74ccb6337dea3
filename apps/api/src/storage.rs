use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::errors::AppError;

/// Thin wrapper over the S3-compatible object store used for resumes,
/// generated reports and avatar renders.
#[derive(Clone)]
pub struct Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl Storage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::S3(format!("download of {key} failed: {e}")))?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| AppError::S3(format!("reading {key} failed: {e}")))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

/// Object key for a resume upload. The file name is reduced to a safe charset.
pub fn resume_key(user_id: uuid::Uuid, version: i32, file_name: &str) -> String {
    format!("resumes/{user_id}/v{version}-{}", sanitize_file_name(file_name))
}

pub fn report_key(report_id: uuid::Uuid, kind: &str) -> String {
    format!("reports/{report_id}/{kind}.pdf")
}

pub fn avatar_key(render_id: uuid::Uuid) -> String {
    format!("avatars/{render_id}.mp4")
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "resume.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_resume_key_strips_path_components() {
        let id = Uuid::nil();
        assert_eq!(
            resume_key(id, 3, "../../etc/My CV.pdf"),
            format!("resumes/{id}/v3-My_CV.pdf")
        );
    }

    #[test]
    fn test_sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_file_name(".."), "resume.pdf");
        assert_eq!(sanitize_file_name(""), "resume.pdf");
    }
}
