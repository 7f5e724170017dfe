use axum::response::IntoResponse;

use crate::templates;

pub async fn handle_home() -> impl IntoResponse {
    templates::Home
}

pub async fn handle_about() -> impl IntoResponse {
    templates::About
}

pub async fn handle_contact() -> impl IntoResponse {
    templates::Contact
}
