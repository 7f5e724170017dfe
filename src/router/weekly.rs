use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_sessions::extractors::WritableSession;

use crate::{
    ingest::Upload,
    posts,
    templates::{self, models::Flash},
};

use super::{error, read_upload, AppState};

pub async fn handle_weekly(
    State(state): State<AppState>,
    mut session: WritableSession,
) -> Result<impl IntoResponse, Response> {
    let flash = session.get("flash").unwrap_or_default();
    if !matches!(flash, Flash::None) {
        session.remove("flash");
    }
    let posts = posts::list_posts(&state.storage)
        .await
        .map_err(error::err_into_500)?;
    Ok(templates::Weekly { flash, posts })
}

pub async fn handle_upload_form() -> impl IntoResponse {
    templates::UploadPost
}

pub async fn handle_upload_post(
    State(state): State<AppState>,
    mut session: WritableSession,
    mp: Multipart,
) -> Result<Redirect, Response> {
    let form = read_post_mp(mp).await.map_err(error::err_into_500)?;
    let content = state
        .ingest
        .post_content(form.file, form.content.unwrap_or_default())
        .await
        .map_err(error::err_into_500)?;
    posts::create_post(&state.storage, form.title, content)
        .await
        .map_err(error::err_into_500)?;

    session
        .insert("flash", Flash::Success("Post was published".into()))
        .map_err(error::err_into_500)?;
    Ok(Redirect::to("/weekly"))
}

#[derive(Default)]
struct PostForm {
    title: Option<String>,
    content: Option<String>,
    file: Option<Upload>,
}

async fn read_post_mp(mut mp: Multipart) -> color_eyre::Result<PostForm> {
    let mut form = PostForm::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => form.title = Some(field.text().await?),
            Some("content") => form.content = Some(field.text().await?),
            Some("file") => form.file = read_upload(field).await?,
            _ => {}
        }
    }
    Ok(form)
}
