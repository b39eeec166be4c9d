//! Read-only views of what the server returns for a webhook message.
//!
//! These only deserialize. To send something back, reduce them into the
//! sendable model with [`ReceivedEmbed::reduced`] or
//! [`Message::from_received`](crate::types::Message::from_received).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};

use crate::types::embed::{Embed, EmbedAuthor, EmbedBuilder, EmbedField, EmbedFooter};

/// Snowflakes arrive as strings, but accept bare integers too.
pub(crate) mod snowflake {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct SnowflakeVisitor;

    impl Visitor<'_> for SnowflakeVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a snowflake as a string or integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom("negative snowflake"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(|_| E::custom(format!("invalid snowflake: {v:?}")))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(SnowflakeVisitor)
    }

    pub fn deserialize_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        #[derive(serde::Deserialize)]
        struct Wrapped(#[serde(deserialize_with = "deserialize")] u64);

        let wrapped: Vec<Wrapped> = serde::Deserialize::deserialize(deserializer)?;
        Ok(wrapped.into_iter().map(|Wrapped(id)| id).collect())
    }
}

/// `null` and missing both become the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message as returned by `POST ?wait=true`, `PATCH` or `GET`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReceivedMessage {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub channel_id: u64,
    pub author: ReceivedUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tts: bool,
    #[serde(default)]
    pub mention_everyone: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: u64,
    #[serde(default)]
    pub mentions: Vec<ReceivedUser>,
    #[serde(default, deserialize_with = "snowflake::deserialize_vec")]
    pub mention_roles: Vec<u64>,
    #[serde(default)]
    pub embeds: Vec<ReceivedEmbed>,
    #[serde(default)]
    pub attachments: Vec<ReceivedAttachment>,
}

impl ReceivedMessage {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReceivedUser {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl ReceivedUser {
    /// CDN URL of the avatar, if one is set.
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar.as_ref().map(|hash| {
            format!("https://cdn.discordapp.com/avatars/{}/{}.png", self.id, hash)
        })
    }

    /// `Username#Discriminator`, or just `Username` for the new username system.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReceivedAttachment {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    pub filename: String,
    pub url: String,
    pub proxy_url: String,
    pub size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

/// An embed as rendered by the server, including metadata it fills in
/// (proxy urls, sizes, provider, video).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ReceivedEmbed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub footer: Option<EmbedFooter>,
    #[serde(default)]
    pub author: Option<EmbedAuthor>,
    #[serde(default)]
    pub image: Option<EmbedImage>,
    #[serde(default)]
    pub thumbnail: Option<EmbedImage>,
    #[serde(default)]
    pub provider: Option<EmbedProvider>,
    #[serde(default)]
    pub video: Option<EmbedVideo>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbedImage {
    pub url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbedProvider {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbedVideo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl ReceivedEmbed {
    /// Drop server-only metadata and return the sendable shape.
    ///
    /// Returns `None` when nothing sendable is left (e.g. a bare video
    /// preview).
    pub fn reduced(&self) -> Option<Embed> {
        let mut builder = EmbedBuilder::new();
        if let Some(title) = &self.title {
            builder = builder.title(title.clone());
        }
        if let Some(url) = &self.url {
            builder = builder.url(url.clone());
        }
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        if let Some(color) = self.color {
            builder = builder.color(color);
        }
        if let Some(timestamp) = self.timestamp {
            builder = builder.timestamp(timestamp);
        }
        if let Some(footer) = &self.footer {
            builder = match &footer.icon_url {
                Some(icon) => builder.footer_with_icon(footer.text.clone(), icon.clone()),
                None => builder.footer(footer.text.clone()),
            };
        }
        if let Some(author) = &self.author {
            builder = builder.author(author.clone());
        }
        if let Some(image) = &self.image {
            builder = builder.image(image.url.clone());
        }
        if let Some(thumbnail) = &self.thumbnail {
            builder = builder.thumbnail(thumbnail.url.clone());
        }
        for field in &self.fields {
            builder = builder.add_field(field.clone());
        }
        builder.build().ok()
    }
}
