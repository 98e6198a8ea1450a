//! Request and response types for the Notion pages API.
//!
//! Property values follow Notion's shape: each property is a tagged
//! object keyed by its type (`title`, `rich_text`, `date`, ...). Only
//! the property kinds this pipeline writes are modeled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A page property value, serialized in Notion's wire shape.
///
/// Untagged: each variant's single field is the type key Notion
/// expects (`title`, `rich_text`, `date`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Title { title: Vec<RichText> },
    RichText { rich_text: Vec<RichText> },
    Date { date: DateValue },
    Select { select: SelectValue },
    MultiSelect { multi_select: Vec<SelectValue> },
    Number { number: f64 },
    Url { url: String },
    Files { files: Vec<FileValue> },
}

impl PropertyValue {
    pub fn title(text: impl Into<String>) -> Self {
        PropertyValue::Title {
            title: vec![RichText::text(text)],
        }
    }

    pub fn rich_text(text: impl Into<String>) -> Self {
        PropertyValue::RichText {
            rich_text: vec![RichText::text(text)],
        }
    }

    /// A date property from an ISO-8601 date or datetime string.
    pub fn date(start: impl Into<String>) -> Self {
        PropertyValue::Date {
            date: DateValue {
                start: start.into(),
            },
        }
    }

    pub fn select(name: impl Into<String>) -> Self {
        PropertyValue::Select {
            select: SelectValue { name: name.into() },
        }
    }

    pub fn multi_select(names: impl IntoIterator<Item = String>) -> Self {
        PropertyValue::MultiSelect {
            multi_select: names.into_iter().map(|name| SelectValue { name }).collect(),
        }
    }

    pub fn number(number: f64) -> Self {
        PropertyValue::Number { number }
    }

    pub fn url(url: impl Into<String>) -> Self {
        PropertyValue::Url { url: url.into() }
    }

    /// An externally hosted file attachment.
    pub fn external_file(name: impl Into<String>, url: impl Into<String>) -> Self {
        PropertyValue::Files {
            files: vec![FileValue {
                name: name.into(),
                external: ExternalFile { url: url.into() },
            }],
        }
    }

    /// The plain-text content, if this is a text-bearing property.
    pub fn plain_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Title { title } => title.first().map(|t| t.text.content.as_str()),
            PropertyValue::RichText { rich_text } => {
                rich_text.first().map(|t| t.text.content.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    pub text: TextContent,
}

impl RichText {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: TextContent {
                content: content.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectValue {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileValue {
    pub name: String,
    pub external: ExternalFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFile {
    pub url: String,
}

/// Named property map for a page write, ordered by property name so
/// serialized requests are deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Serialize)]
pub struct CreatePageRequest {
    pub parent: Parent,
    pub properties: Properties,
}

#[derive(Debug, Serialize)]
pub struct Parent {
    pub database_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePageResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
