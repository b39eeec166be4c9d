//! Sendable rich embeds and their builder.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Maximum number of fields in one embed.
pub const MAX_FIELDS: usize = 25;

/// A rich embed as sent to the server.
///
/// Immutable; construct one with [`EmbedBuilder`] or convert a received
/// embed with [`ReceivedEmbed::reduced`](crate::types::ReceivedEmbed::reduced).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedUrl>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
}

impl Embed {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Link attached to the title. Never set without a title.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn color(&self) -> Option<u32> {
        self.color
    }

    pub fn timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        self.timestamp.as_ref()
    }

    pub fn footer(&self) -> Option<&EmbedFooter> {
        self.footer.as_ref()
    }

    pub fn author(&self) -> Option<&EmbedAuthor> {
        self.author.as_ref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image.as_ref().map(|image| image.url.as_str())
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail.as_ref().map(|thumbnail| thumbnail.url.as_str())
    }

    pub fn fields(&self) -> &[EmbedField] {
        &self.fields
    }
}

/// One `name: value` entry of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// `{ "url": ... }` wrapper used for images and thumbnails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct EmbedUrl {
    url: String,
}

// ===========================================================================
// Builder
// ===========================================================================

/// Ergonomic builder for [`Embed`].
///
/// ```ignore
/// let embed = EmbedBuilder::new()
///     .title("Deploy finished")
///     .description("All green")
///     .color(0x00FF00)
///     .field("Duration", "42s", true)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmbedBuilder {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    color: Option<u32>,
    timestamp: Option<DateTime<FixedOffset>>,
    footer: Option<EmbedFooter>,
    author: Option<EmbedAuthor>,
    image_url: Option<String>,
    thumbnail_url: Option<String>,
    fields: Vec<EmbedField>,
}

impl EmbedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing embed.
    pub fn from_embed(embed: &Embed) -> Self {
        Self {
            title: embed.title.clone(),
            url: embed.url.clone(),
            description: embed.description.clone(),
            color: embed.color,
            timestamp: embed.timestamp,
            footer: embed.footer.clone(),
            author: embed.author.clone(),
            image_url: embed.image.as_ref().map(|i| i.url.clone()),
            thumbnail_url: embed.thumbnail.as_ref().map(|t| t.url.clone()),
            fields: embed.fields.clone(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Make the title a link. Ignored if no title is set at build time.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the color as a 24-bit RGB integer, e.g. `0xFF6600`. Higher bits
    /// are discarded.
    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color & 0xFF_FF_FF);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<DateTime<FixedOffset>>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url: None,
        });
        self
    }

    pub fn footer_with_icon(mut self, text: impl Into<String>, icon_url: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url: Some(icon_url.into()),
        });
        self
    }

    pub fn author(mut self, author: EmbedAuthor) -> Self {
        self.author = Some(author);
        self
    }

    pub fn author_name(self, name: impl Into<String>) -> Self {
        self.author(EmbedAuthor {
            name: name.into(),
            url: None,
            icon_url: None,
        })
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField::new(name, value, inline));
        self
    }

    pub fn add_field(mut self, field: EmbedField) -> Self {
        self.fields.push(field);
        self
    }

    /// True when nothing visible would be rendered. Color alone does not
    /// count as content.
    pub fn is_empty(&self) -> bool {
        is_blank(&self.description)
            && is_blank(&self.image_url)
            && is_blank(&self.thumbnail_url)
            && is_blank(&self.title)
            && self.footer.as_ref().map_or(true, |f| f.text.trim().is_empty())
            && self.author.as_ref().map_or(true, |a| a.name.trim().is_empty())
            && self
                .fields
                .iter()
                .all(|f| f.name.trim().is_empty() && f.value.trim().is_empty())
            && self.timestamp.is_none()
    }

    /// Consume the builder and return the finished [`Embed`].
    pub fn build(self) -> Result<Embed, BuildError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(BuildError::TooManyFields {
                len: self.fields.len(),
                max: MAX_FIELDS,
            });
        }
        if self.is_empty() {
            return Err(BuildError::EmptyEmbed);
        }

        let url = self.title.as_ref().and(self.url);
        Ok(Embed {
            title: self.title,
            url,
            description: self.description,
            color: self.color,
            timestamp: self.timestamp,
            footer: self.footer,
            author: self.author,
            image: self.image_url.map(|url| EmbedUrl { url }),
            thumbnail: self.thumbnail_url.map(|url| EmbedUrl { url }),
            fields: self.fields,
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embed_builder_basic() {
        let embed = EmbedBuilder::new()
            .title("Test Title")
            .description("Test Description")
            .color(0xFF0000)
            .footer("Footer text")
            .build()
            .unwrap();

        assert_eq!(embed.title(), Some("Test Title"));
        assert_eq!(embed.description(), Some("Test Description"));
        assert_eq!(embed.color(), Some(0xFF0000));
        assert_eq!(embed.footer().unwrap().text, "Footer text");
    }

    #[test]
    fn twenty_five_fields_is_the_limit() {
        let full = (0..25).fold(EmbedBuilder::new(), |b, i| {
            b.field(format!("name{i}"), "value", i % 2 == 0)
        });
        assert_eq!(full.clone().build().unwrap().fields().len(), 25);

        let err = full.field("one", "too many", false).build().unwrap_err();
        assert_eq!(err, BuildError::TooManyFields { len: 26, max: 25 });
    }

    #[test]
    fn empty_embed_is_rejected() {
        assert_eq!(EmbedBuilder::new().build().unwrap_err(), BuildError::EmptyEmbed);
        assert_eq!(
            EmbedBuilder::new().color(0x123456).title("  ").build().unwrap_err(),
            BuildError::EmptyEmbed
        );
    }

    #[test]
    fn color_is_masked_to_24_bits() {
        let embed = EmbedBuilder::new().description("x").color(0xFF12_3456).build().unwrap();
        assert_eq!(embed.color(), Some(0x12_3456));
    }

    #[test]
    fn url_requires_title() {
        let embed = EmbedBuilder::new()
            .description("no title")
            .url("https://example.com")
            .build()
            .unwrap();
        assert_eq!(embed.url(), None);
    }

    #[test]
    fn serializes_wire_shape() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+00:00").unwrap();
        let embed = EmbedBuilder::new()
            .title("Release")
            .url("https://example.com/release")
            .timestamp(timestamp)
            .image("https://example.com/a.png")
            .thumbnail("https://example.com/t.png")
            .author(EmbedAuthor {
                name: "ci".into(),
                url: None,
                icon_url: Some("https://example.com/ci.png".into()),
            })
            .field("Version", "1.2.3", true)
            .build()
            .unwrap();

        let value = serde_json::to_value(&embed).unwrap();
        assert_eq!(
            value,
            json!({
                "title": "Release",
                "url": "https://example.com/release",
                "timestamp": "2024-05-01T12:00:00+00:00",
                "author": { "name": "ci", "icon_url": "https://example.com/ci.png" },
                "image": { "url": "https://example.com/a.png" },
                "thumbnail": { "url": "https://example.com/t.png" },
                "fields": [{ "name": "Version", "value": "1.2.3", "inline": true }]
            })
        );
    }

    #[test]
    fn from_embed_round_trips_through_builder() {
        let embed = EmbedBuilder::new().title("a").field("k", "v", false).build().unwrap();
        let copy = EmbedBuilder::from_embed(&embed).build().unwrap();
        assert_eq!(embed, copy);
    }
}
