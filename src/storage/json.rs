use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use color_eyre::{eyre::Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::templates::models::{Post, DATE_FORMAT};

#[derive(Serialize, Deserialize)]
struct ImageData {
    image_filename: Option<String>,
}

/// The two flat JSON files backing the site.
#[derive(Debug)]
pub struct JsonStore {
    posts_path: PathBuf,
    image_data_path: PathBuf,
}

impl JsonStore {
    pub fn new(posts_path: impl Into<PathBuf>, image_data_path: impl Into<PathBuf>) -> Self {
        Self {
            posts_path: posts_path.into(),
            image_data_path: image_data_path.into(),
        }
    }

    pub fn posts_path(&self) -> &Path {
        &self.posts_path
    }

    pub fn image_data_path(&self) -> &Path {
        &self.image_data_path
    }

    pub fn load_posts(&self) -> Result<Vec<Post>> {
        Ok(read_json(&self.posts_path)?.unwrap_or_default())
    }

    /// Rewrites the whole post file with the new post included, newest first.
    pub fn append_post(&self, title: String, content: String, time: NaiveDateTime) -> Result<Post> {
        let mut posts = self.load_posts()?;
        let post = Post {
            title,
            content,
            date: time.format(DATE_FORMAT).to_string(),
        };
        posts.push(post.clone());
        // stable, so equal dates keep insertion order
        posts.sort_by(|a, b| b.date.cmp(&a.date));
        write_json(&self.posts_path, &posts)?;
        Ok(post)
    }

    pub fn save_image_reference(&self, filename: &str) -> Result<()> {
        write_json(
            &self.image_data_path,
            &ImageData {
                image_filename: Some(filename.to_owned()),
            },
        )
    }

    pub fn load_image_reference(&self) -> Result<Option<String>> {
        Ok(read_json::<ImageData>(&self.image_data_path)?.and_then(|data| data.image_filename))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).wrap_err_with(|| format!("Failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .wrap_err_with(|| format!("Malformed JSON in {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut ser =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    writer.flush()?;
    Ok(())
}
