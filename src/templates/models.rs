use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Format of [`Post::date`]. Lexical order of formatted dates is chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub content: String,
    pub date: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub enum Flash {
    Success(Cow<'static, str>),
    #[default]
    None,
}
