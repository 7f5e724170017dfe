use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::body::Bytes;
use color_eyre::{eyre::Context, Result};
use tokio::{fs, task};

use crate::{config::Config, docx::DocxExtractor};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "docx"];

/// Post content used when a `.docx` arrives but no extractor is configured.
pub const DOCX_UNAVAILABLE: &str =
    "Error: .docx support is not enabled on this server; cannot process .docx files.";

/// Pulls paragraph text out of a document on disk.
pub trait DocumentExtractor: Send + Sync {
    fn paragraphs(&self, path: &Path) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    PostAttachment,
}

impl UploadKind {
    pub fn accepts(self, extension: &str) -> bool {
        match self {
            Self::Image => IMAGE_EXTENSIONS.contains(&extension),
            Self::PostAttachment => {
                IMAGE_EXTENSIONS.contains(&extension) || DOCUMENT_EXTENSIONS.contains(&extension)
            }
        }
    }
}

#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Bytes,
}

struct Accepted {
    filename: String,
    extension: String,
}

enum Extracted {
    Text(String),
    Unavailable,
    Nothing,
}

pub struct Ingestor {
    upload_dir: PathBuf,
    documents: Option<Arc<dyn DocumentExtractor>>,
}

impl Ingestor {
    pub fn new(upload_dir: impl Into<PathBuf>, documents: Option<Arc<dyn DocumentExtractor>>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            documents,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let documents = cfg
            .docx_extraction
            .then(|| Arc::new(DocxExtractor) as Arc<dyn DocumentExtractor>);
        if documents.is_none() {
            tracing::warn!("docx extraction is disabled, .docx posts will carry a placeholder");
        }
        Self::new(cfg.upload_dir.clone(), documents)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Stores an image in the upload directory and returns its stored name.
    /// Files that are not allowed images are ignored.
    pub async fn ingest_image(&self, upload: Upload) -> Result<Option<String>> {
        let Some(accepted) = accept(&upload.filename, UploadKind::Image) else {
            tracing::debug!("Ignoring image upload {:?}", upload.filename);
            return Ok(None);
        };
        let path = self.upload_dir.join(&accepted.filename);
        fs::write(&path, &upload.bytes)
            .await
            .wrap_err_with(|| format!("Failed to save {}", path.display()))?;
        tracing::info!("Saved image {}", path.display());
        Ok(Some(accepted.filename))
    }

    /// Content of a new post: text pulled from the attachment when there is
    /// any, otherwise `fallback`. The attachment itself is not kept.
    pub async fn post_content(&self, upload: Option<Upload>, fallback: String) -> Result<String> {
        let Some(upload) = upload else {
            return Ok(fallback);
        };
        let Some(accepted) = accept(&upload.filename, UploadKind::PostAttachment) else {
            tracing::debug!("Ignoring post attachment {:?}", upload.filename);
            return Ok(fallback);
        };

        // a private name, so an attachment never clobbers a stored image
        let temp = tempfile::Builder::new()
            .prefix(".attachment-")
            .suffix(&format!(".{}", accepted.extension))
            .tempfile_in(&self.upload_dir)
            .wrap_err_with(|| format!("Failed to create a file in {}", self.upload_dir.display()))?;
        fs::write(temp.path(), &upload.bytes)
            .await
            .wrap_err_with(|| format!("Failed to save {}", temp.path().display()))?;
        let extracted = self.extract(&accepted.extension, temp.path()).await;
        temp.close().wrap_err("Failed to remove the attachment")?;

        Ok(match extracted? {
            Extracted::Text(text) if !text.trim().is_empty() => {
                tracing::info!("Post content taken from {}", accepted.filename);
                text
            }
            Extracted::Text(_) | Extracted::Nothing => fallback,
            Extracted::Unavailable => DOCX_UNAVAILABLE.to_owned(),
        })
    }

    async fn extract(&self, extension: &str, path: &Path) -> Result<Extracted> {
        match extension {
            "docx" => {
                let Some(documents) = self.documents.clone() else {
                    return Ok(Extracted::Unavailable);
                };
                let path = path.to_owned();
                let paragraphs = task::spawn_blocking(move || documents.paragraphs(&path)).await??;
                Ok(Extracted::Text(paragraphs.join("\n")))
            }
            "txt" => {
                let text = fs::read_to_string(path)
                    .await
                    .wrap_err_with(|| format!("{} is not readable UTF-8 text", path.display()))?;
                Ok(Extracted::Text(text.replace("\r\n", "\n").replace('\r', "\n")))
            }
            _ => Ok(Extracted::Nothing),
        }
    }
}

fn accept(original: &str, kind: UploadKind) -> Option<Accepted> {
    let filename = sanitize_filename(original);
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    kind.accepts(&extension).then_some(Accepted {
        filename,
        extension,
    })
}

/// Flattens a client-supplied name into a single safe path component.
///
/// Separators become underscores, non-ASCII and anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing dots and underscores are
/// trimmed, so the result can never name a parent or hidden file.
pub fn sanitize_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_owned()
}
