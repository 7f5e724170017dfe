use std::io;

use axum::{
    body::{boxed, Full, StreamBody},
    extract::{Path, State},
    http::{header, Uri},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::ingest::sanitize_filename;

use super::{error, AppState};

pub async fn static_handler(uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');
    StaticFile(path.strip_prefix("static/").unwrap_or(path).to_owned())
}

/// Streams a previously uploaded file. Only names that could have been
/// produced by [`sanitize_filename`] are looked up.
pub async fn upload_handler(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let file = file.trim_start_matches('/');
    if file.is_empty() || sanitize_filename(file) != file {
        return error::http_404();
    }
    let path = state.ingest.upload_dir().join(file);
    match File::open(&path).await {
        Ok(handle) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                StreamBody::new(ReaderStream::new(handle)),
            )
                .into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => error::http_404(),
        Err(e) => error::err_into_500(e),
    }
}

#[derive(RustEmbed)]
#[folder = "static/"]
#[exclude = "uploads/*"]
struct StaticFiles;

pub struct StaticFile<T>(pub T);

impl<T> IntoResponse for StaticFile<T>
where
    T: Into<String>,
{
    fn into_response(self) -> Response {
        let path = self.0.into();

        match StaticFiles::get(path.as_str()) {
            Some(content) => {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                (
                    [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                    boxed(Full::from(content.data)),
                )
                    .into_response()
            }
            None => error::http_404(),
        }
    }
}
