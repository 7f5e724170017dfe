use chrono::Local;
use color_eyre::Result;

use crate::{storage::ExecutorConnection, templates::models::Post};

pub const DEFAULT_TITLE: &str = "Untitled Post";

pub async fn create_post(
    storage: &ExecutorConnection,
    title: Option<String>,
    content: String,
) -> Result<Post> {
    let title = title.unwrap_or_else(|| DEFAULT_TITLE.to_owned());
    let post = storage
        .append_post(title, content, Local::now().naive_local())
        .await?;
    tracing::info!("Published post {:?} ({})", post.title, post.date);
    Ok(post)
}

pub async fn list_posts(storage: &ExecutorConnection) -> Result<Vec<Post>> {
    storage.load_posts().await
}
