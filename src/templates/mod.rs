use askama::Template;

use self::models::{Flash, Post};

pub mod models;

#[derive(Template)]
#[template(path = "home.html")]
pub struct Home;

#[derive(Template)]
#[template(path = "about.html")]
pub struct About;

#[derive(Template)]
#[template(path = "contact.html")]
pub struct Contact;

#[derive(Template)]
#[template(path = "weekly.html")]
pub struct Weekly {
    pub flash: Flash,
    pub posts: Vec<Post>,
}

#[derive(Template)]
#[template(path = "upload_post.html")]
pub struct UploadPost;

#[derive(Template)]
#[template(path = "account_summary.html")]
pub struct AccountSummary {
    /// Stored name of the image under the upload directory.
    pub image: Option<String>,
}
