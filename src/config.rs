use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::PathBuf};
use color_eyre::{eyre::Context, Result};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub listen: SocketAddr,
    pub cookie_secret: String,
    #[serde(default = "default_posts_file")]
    pub posts_file: PathBuf,
    #[serde(default = "default_image_data_file")]
    pub image_data_file: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Turning this off makes `.docx` uploads produce a placeholder post.
    #[serde(default = "default_docx_extraction")]
    pub docx_extraction: bool,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_posts_file() -> PathBuf {
    "posts.json".into()
}

fn default_image_data_file() -> PathBuf {
    "image_data.json".into()
}

fn default_upload_dir() -> PathBuf {
    "static/uploads".into()
}

fn default_docx_extraction() -> bool {
    true
}

fn default_max_upload_size() -> usize {
    16 * 1024 * 1024
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = env::var("FUNDSITE_CONFIG");
        let path = env.as_deref().unwrap_or("fundsite.toml");
        let config_str =
            fs::read_to_string(path).wrap_err_with(|| format!("Failed to read {path}"))?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }
}
