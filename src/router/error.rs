use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::fmt::Debug;

const HTML_404: &[u8] = include_bytes!("html/404.html");
const HTML_500: &[u8] = include_bytes!("html/500.html");

pub fn http_404() -> Response {
    (StatusCode::NOT_FOUND, Html(HTML_404)).into_response()
}

pub fn err_into_500<T: Debug>(e: T) -> Response {
    tracing::error!("{e:?}");
    (StatusCode::INTERNAL_SERVER_ERROR, Html(HTML_500)).into_response()
}
