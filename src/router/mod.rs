use std::sync::Arc;

use axum::{
    extract::{multipart::Field, DefaultBodyLimit},
    routing::get,
    Router,
};
use axum_sessions::{
    async_session::{
        base64::{self, URL_SAFE_NO_PAD},
        MemoryStore,
    },
    SessionLayer,
};
use color_eyre::{eyre::ensure, Result};

use crate::{
    config::Config,
    ingest::{Ingestor, Upload},
    storage::ExecutorConnection,
};

mod account;
mod error;
mod pages;
mod static_files;
mod weekly;

#[derive(Clone)]
pub struct AppState {
    storage: ExecutorConnection,
    ingest: Arc<Ingestor>,
}

pub async fn build(storage: ExecutorConnection, cfg: Arc<Config>, store: MemoryStore) -> Result<Router> {
    let secret = base64::decode_config(&cfg.cookie_secret, URL_SAFE_NO_PAD)?;
    ensure!(secret.len() >= 64, "cookie_secret must decode to at least 64 bytes");
    let ingest = Arc::new(Ingestor::from_config(&cfg));
    let router = Router::new()
        .route("/", get(pages::handle_home))
        .route("/about", get(pages::handle_about))
        .route("/contact", get(pages::handle_contact))
        .route("/weekly", get(weekly::handle_weekly))
        .route(
            "/upload_post",
            get(weekly::handle_upload_form).post(weekly::handle_upload_post),
        )
        .route(
            "/account_summary",
            get(account::handle_summary).post(account::handle_upload_image),
        )
        .route("/static/*file", get(static_files::static_handler))
        .route("/uploads/*file", get(static_files::upload_handler))
        .fallback_service(get(|| async { error::http_404() }))
        .layer(DefaultBodyLimit::max(cfg.max_upload_size))
        .layer(SessionLayer::new(store, &secret))
        .with_state(AppState { storage, ingest });
    Ok(router)
}

/// The uploaded file in a multipart field, if the form carried one.
async fn read_upload(field: Field<'_>) -> Result<Option<Upload>> {
    let filename = field.file_name().unwrap_or_default().to_owned();
    let bytes = field.bytes().await?;
    // browsers send an empty, unnamed part when no file was picked
    if filename.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload { filename, bytes }))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{docx::testing::docx_bytes, ingest::DOCX_UNAVAILABLE, storage::spawn_test_executor};

    const BOUNDARY: &str = "fundsite-test-boundary";

    fn config(dir: &Path, docx_extraction: bool) -> Config {
        Config {
            log_level: "debug".into(),
            listen: "127.0.0.1:0".parse().unwrap(),
            cookie_secret: "A".repeat(86),
            posts_file: dir.join("posts.json"),
            image_data_file: dir.join("image_data.json"),
            upload_dir: dir.join("uploads"),
            docx_extraction,
            max_upload_size: 1024 * 1024,
        }
    }

    async fn app(dir: &TempDir, docx_extraction: bool) -> Router {
        let cfg = config(dir.path(), docx_extraction);
        std::fs::create_dir_all(&cfg.upload_dir).unwrap();
        let storage = spawn_test_executor(dir.path());
        build(storage, Arc::new(cfg), MemoryStore::new()).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn static_pages_render() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        for (uri, heading) in [
            ("/", "<title>Home</title>"),
            ("/about", "<title>About</title>"),
            ("/contact", "<title>Contact</title>"),
            ("/upload_post", "<title>Upload Weekly Post</title>"),
        ] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert!(body_string(response).await.contains(heading), "{uri}");
        }
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        let response = app.oneshot(get_request("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stylesheet_is_served() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        let response = app.oneshot(get_request("/static/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn empty_weekly_listing() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        let response = app.oneshot(get_request("/weekly")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("No posts yet."));
    }

    #[tokio::test]
    async fn txt_upload_becomes_post() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/upload_post",
                &[
                    Part::Text("title", "Week 12"),
                    Part::Text("content", ""),
                    Part::File("file", "notes.txt", b"Hello"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/weekly");

        let page = body_string(app.oneshot(get_request("/weekly")).await.unwrap()).await;
        assert!(page.contains("Week 12"));
        assert!(page.contains("Hello"));
        assert!(!dir.path().join("uploads/notes.txt").exists());
    }

    #[tokio::test]
    async fn publish_flash_is_shown_once() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/upload_post",
                &[Part::Text("title", "Flash"), Part::Text("content", "body")],
            ))
            .await
            .unwrap();
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned();

        let with_cookie = || {
            Request::builder()
                .uri("/weekly")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap()
        };
        let page = body_string(app.clone().oneshot(with_cookie()).await.unwrap()).await;
        assert!(page.contains("Post was published"));
        let page = body_string(app.oneshot(with_cookie()).await.unwrap()).await;
        assert!(!page.contains("Post was published"));
        assert!(page.contains("Flash"));
    }

    #[tokio::test]
    async fn text_field_post_without_file() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/upload_post",
                &[
                    Part::Text("content", "Typed <b>directly</b>"),
                    Part::File("file", "", b""),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = body_string(app.oneshot(get_request("/weekly")).await.unwrap()).await;
        assert!(page.contains("Untitled Post"));
        assert!(page.contains("Typed &lt;b&gt;directly"));
        assert!(!page.contains("<b>directly"));
    }

    #[tokio::test]
    async fn docx_without_extractor_posts_placeholder() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, false).await;
        let doc = docx_bytes(&["A", "B"]);

        app.clone()
            .oneshot(multipart_request(
                "/upload_post",
                &[Part::Text("title", "Doc"), Part::File("file", "week.docx", &doc)],
            ))
            .await
            .unwrap();

        let posts: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("posts.json")).unwrap())
                .unwrap();
        assert_eq!(posts[0]["content"], DOCX_UNAVAILABLE);
    }

    #[tokio::test]
    async fn docx_upload_becomes_post() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        let doc = docx_bytes(&["A", "B"]);

        app.oneshot(multipart_request(
            "/upload_post",
            &[Part::Text("title", "Doc"), Part::File("file", "week.docx", &doc)],
        ))
        .await
        .unwrap();

        let posts: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("posts.json")).unwrap())
                .unwrap();
        assert_eq!(posts[0]["content"], "A\nB");
    }

    #[tokio::test]
    async fn malformed_posts_file_is_500() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        std::fs::write(dir.path().join("posts.json"), "not json").unwrap();
        let response = app.oneshot(get_request("/weekly")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn account_summary_image_flow() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;

        let page = body_string(app.clone().oneshot(get_request("/account_summary")).await.unwrap()).await;
        assert!(page.contains("No summary image"));

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/account_summary",
                &[Part::File("file", "../summary.png", b"\x89PNG\r\n\x1a\n")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("src=\"/uploads/summary.png\""));

        // not an allowed image: the previous one stays
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/account_summary",
                &[Part::File("file", "summary.bmp", b"BM")],
            ))
            .await
            .unwrap();
        assert!(body_string(response).await.contains("src=\"/uploads/summary.png\""));
        assert!(!dir.path().join("uploads/summary.bmp").exists());

        let page = body_string(app.clone().oneshot(get_request("/account_summary")).await.unwrap()).await;
        assert!(page.contains("src=\"/uploads/summary.png\""));

        let response = app.oneshot(get_request("/uploads/summary.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn post_attachment_keeps_summary_image() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;

        app.clone()
            .oneshot(multipart_request(
                "/account_summary",
                &[Part::File("file", "pic.png", b"\x89PNG summary")],
            ))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/upload_post",
                &[Part::Text("title", "Chart"), Part::File("file", "pic.png", b"other bytes")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = body_string(app.clone().oneshot(get_request("/account_summary")).await.unwrap()).await;
        assert!(page.contains("src=\"/uploads/pic.png\""));
        let response = app.oneshot(get_request("/uploads/pic.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG summary");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("uploads"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, ["pic.png"]);
    }

    #[tokio::test]
    async fn uploads_outside_directory_are_not_served() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true).await;
        std::fs::write(dir.path().join("posts.json"), "[]").unwrap();
        for uri in ["/uploads/../posts.json", "/uploads/%2E%2E%2Fposts.json", "/uploads/missing.png"] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
