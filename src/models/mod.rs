use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Fixed kind of lab attachment, also the multipart field name it arrives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Writeup / rubric document
    Rubric,
    /// Output screenshots or results
    Output,
    Code,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Rubric, Category::Output, Category::Code];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Rubric => "rubric",
            Category::Output => "output",
            Category::Code => "code",
        }
    }

    /// Maps a multipart field name onto a category
    pub fn from_field(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rubric" => Ok(Category::Rubric),
            "output" => Ok(Category::Output),
            "code" => Ok(Category::Code),
            other => Err(anyhow::anyhow!("Unknown category: {}", other)),
        }
    }
}

/// A stored upload as seen by the rest of the application
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub id: i32,
    pub batch: Option<String>,
    pub subject: String,
    pub experiment: String,
    pub category: Category,
    pub filename: String,
    pub url: String,
    pub storage_key: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a record about to be appended
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub batch: Option<String>,
    pub subject: String,
    pub experiment: String,
    pub category: Category,
    pub filename: String,
    pub url: String,
    pub storage_key: String,
    pub size: i64,
    pub content_type: Option<String>,
}

/// subject -> experiment -> category -> [(filename, url)]
///
/// `BTreeMap` keeps every level in lexicographic key order.
pub type CatalogView = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<(String, String)>>>>;
