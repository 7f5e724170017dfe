use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
};

use crate::{ingest::Upload, templates};

use super::{error, read_upload, AppState};

pub async fn handle_summary(State(state): State<AppState>) -> Result<impl IntoResponse, Response> {
    let image = state
        .storage
        .load_image_reference()
        .await
        .map_err(error::err_into_500)?;
    Ok(templates::AccountSummary { image })
}

/// Unsupported files leave the current image in place without complaint.
pub async fn handle_upload_image(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<impl IntoResponse, Response> {
    let mut image = state
        .storage
        .load_image_reference()
        .await
        .map_err(error::err_into_500)?;

    let upload = read_image_mp(mp).await.map_err(error::err_into_500)?;
    if let Some(upload) = upload {
        let stored = state
            .ingest
            .ingest_image(upload)
            .await
            .map_err(error::err_into_500)?;
        if let Some(filename) = stored {
            state
                .storage
                .save_image_reference(filename.clone())
                .await
                .map_err(error::err_into_500)?;
            image = Some(filename);
        }
    }

    Ok(templates::AccountSummary { image })
}

async fn read_image_mp(mut mp: Multipart) -> color_eyre::Result<Option<Upload>> {
    let mut upload = None;
    while let Some(field) = mp.next_field().await? {
        if field.name() == Some("file") {
            upload = read_upload(field).await?;
        }
    }
    Ok(upload)
}
