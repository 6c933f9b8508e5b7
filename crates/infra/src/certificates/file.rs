use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, instrument};

use lectern_learning::{CertificateRef, CourseCompleted};

use super::{CertificateError, CertificateIssuer};

/// Writes plain-text certificates into a directory.
///
/// Files are named `certificate_{user}_{course}_{unix seconds}.txt`; the returned
/// reference is `{url_prefix}/{file name}`.
#[derive(Debug, Clone)]
pub struct FileCertificateIssuer {
    dir: PathBuf,
    url_prefix: String,
}

impl FileCertificateIssuer {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn file_name(completion: &CourseCompleted) -> String {
        format!(
            "certificate_{}_{}_{}.txt",
            completion.user_id,
            completion.course_id,
            completion.completed_at.timestamp()
        )
    }
}

/// Certificate body.
pub fn render(completion: &CourseCompleted) -> String {
    let full_name = format!("{} {}", completion.first_name, completion.last_name);
    format!(
        "CERTIFICATE OF COMPLETION\n\n\
         This is to certify that\n\n\
         {} ({})\n\n\
         has successfully completed the course\n\n\
         {}\n\n\
         Instructor: {}\n\
         Date of Completion: {}\n",
        full_name.trim(),
        completion.username,
        completion.course_title,
        completion.instructor,
        completion.completed_at.format("%B %-d, %Y"),
    )
}

#[async_trait]
impl CertificateIssuer for FileCertificateIssuer {
    #[instrument(
        skip(self, completion),
        fields(user_id = %completion.user_id, course_id = %completion.course_id),
        err
    )]
    async fn issue(&self, completion: &CourseCompleted) -> Result<CertificateRef, CertificateError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = Self::file_name(completion);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, render(completion)).await?;
        debug!(path = %path.display(), "certificate written");

        Ok(CertificateRef::new(format!("{}/{}", self.url_prefix, name)))
    }
}
