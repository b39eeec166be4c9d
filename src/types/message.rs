//! The immutable outbound message and its builder.

use bitflags::bitflags;
use serde::Serialize;

use crate::error::BuildError;
use crate::http::{multipart_body, FilePart, RequestBody};
use crate::types::embed::Embed;
use crate::types::mentions::AllowedMentions;
use crate::types::received::ReceivedMessage;

/// Maximum length of `content`, counted in characters.
pub const MAX_CONTENT_LENGTH: usize = 2000;
/// Maximum number of embeds per message.
pub const MAX_EMBEDS: usize = 10;
/// Maximum number of attachments per message.
pub const MAX_FILES: usize = 10;

bitflags! {
    /// Message flags understood by webhook endpoints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u64 {
        const SUPPRESS_EMBEDS = 1 << 2;
        /// Only honoured for interaction webhooks.
        const EPHEMERAL = 1 << 6;
        const SUPPRESS_NOTIFICATIONS = 1 << 12;
    }
}

impl Default for MessageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A named binary blob uploaded alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub name: String,
    pub data: Vec<u8>,
}

impl MessageAttachment {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

// ===========================================================================
// Message
// ===========================================================================

/// A finished, validated webhook message.
///
/// Build one with [`MessageBuilder`] or one of the shortcut constructors.
/// Messages never change after construction; [`Message::with_ephemeral`]
/// returns a modified copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    content: Option<String>,
    embeds: Vec<Embed>,
    attachments: Vec<MessageAttachment>,
    username: Option<String>,
    avatar_url: Option<String>,
    tts: bool,
    flags: MessageFlags,
    allowed_mentions: Option<AllowedMentions>,
    thread_name: Option<String>,
}

impl Message {
    /// A plain text message.
    pub fn text(content: impl Into<String>) -> Result<Self, BuildError> {
        MessageBuilder::new().content(content).build()
    }

    pub fn embeds(embeds: impl IntoIterator<Item = Embed>) -> Result<Self, BuildError> {
        MessageBuilder::new().embeds(embeds).build()
    }

    /// A message carrying a single attachment.
    pub fn file(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<Self, BuildError> {
        MessageBuilder::new().file(name, data).build()
    }

    /// Copy a received message so it can be re-sent. The original author
    /// becomes the username/avatar override. Attachments are not copied.
    pub fn from_received(message: &ReceivedMessage) -> Result<Self, BuildError> {
        let mut builder = MessageBuilder::new()
            .content(message.content.clone())
            .username(message.author.username.clone())
            .tts(message.tts)
            .ephemeral(message.flags & MessageFlags::EPHEMERAL.bits() != 0)
            .embeds(message.embeds.iter().filter_map(|embed| embed.reduced()));
        if let Some(avatar) = message.author.avatar_url() {
            builder = builder.avatar_url(avatar);
        }
        builder.build()
    }

    /// A copy of this message with the ephemeral flag set or cleared.
    pub fn with_ephemeral(&self, ephemeral: bool) -> Self {
        let mut copy = self.clone();
        copy.flags.set(MessageFlags::EPHEMERAL, ephemeral);
        copy
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn embed_list(&self) -> &[Embed] {
        &self.embeds
    }

    pub fn attachments(&self) -> &[MessageAttachment] {
        &self.attachments
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    pub fn is_tts(&self) -> bool {
        self.tts
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn is_ephemeral(&self) -> bool {
        self.flags.contains(MessageFlags::EPHEMERAL)
    }

    pub fn allowed_mentions(&self) -> Option<&AllowedMentions> {
        self.allowed_mentions.as_ref()
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub fn is_file(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// The JSON payload. `default_mentions` is used when the message has no
    /// allow-list of its own.
    pub fn to_json(&self, default_mentions: &AllowedMentions) -> Result<String, serde_json::Error> {
        let payload = Payload {
            content: self.content.as_deref(),
            embeds: &self.embeds,
            username: self.username.as_deref(),
            avatar_url: self.avatar_url.as_deref(),
            tts: self.tts,
            allowed_mentions: self.allowed_mentions.as_ref().unwrap_or(default_mentions),
            flags: self.flags.bits(),
            thread_name: self.thread_name.as_deref(),
        };
        serde_json::to_string(&payload)
    }

    /// Encode as a request body: JSON, or multipart when there are
    /// attachments.
    pub fn encode(&self, default_mentions: &AllowedMentions) -> Result<RequestBody, serde_json::Error> {
        let json = self.to_json(default_mentions)?;
        if self.attachments.is_empty() {
            return Ok(RequestBody::json(json.into_bytes()));
        }

        let files = self
            .attachments
            .iter()
            .enumerate()
            .map(|(i, attachment)| FilePart {
                field: format!("file{}", i),
                filename: &attachment.name,
                data: &attachment.data,
            });
        Ok(multipart_body(&json, files))
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: &'a [Embed],
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    tts: bool,
    allowed_mentions: &'a AllowedMentions,
    flags: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_name: Option<&'a str>,
}

// ===========================================================================
// Builder
// ===========================================================================

/// Accumulates message parts; limits are checked by [`MessageBuilder::build`].
///
/// ```ignore
/// let message = MessageBuilder::new()
///     .content("Deploy finished")
///     .username("ci")
///     .embed(embed)
///     .file("report.txt", report_bytes)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    content: String,
    embeds: Vec<Embed>,
    attachments: Vec<MessageAttachment>,
    username: Option<String>,
    avatar_url: Option<String>,
    tts: bool,
    flags: MessageFlags,
    allowed_mentions: Option<AllowedMentions>,
    thread_name: Option<String>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing message.
    pub fn from_message(message: &Message) -> Self {
        Self {
            content: message.content.clone().unwrap_or_default(),
            embeds: message.embeds.clone(),
            attachments: message.attachments.clone(),
            username: message.username.clone(),
            avatar_url: message.avatar_url.clone(),
            tts: message.tts,
            flags: message.flags,
            allowed_mentions: message.allowed_mentions.clone(),
            thread_name: message.thread_name.clone(),
        }
    }

    /// Replace the content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Append to the content.
    pub fn append(mut self, text: &str) -> Self {
        self.content.push_str(text);
        self
    }

    /// Override the webhook's display name. Blank names are ignored.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = non_blank(username.into());
        self
    }

    /// Override the webhook's avatar. Blank urls are ignored.
    pub fn avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = non_blank(avatar_url.into());
        self
    }

    pub fn tts(mut self, tts: bool) -> Self {
        self.tts = tts;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.flags.set(MessageFlags::EPHEMERAL, ephemeral);
        self
    }

    pub fn flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn embeds(mut self, embeds: impl IntoIterator<Item = Embed>) -> Self {
        self.embeds.extend(embeds);
        self
    }

    pub fn file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.attachments.push(MessageAttachment::new(name, data));
        self
    }

    pub fn allowed_mentions(mut self, mentions: AllowedMentions) -> Self {
        self.allowed_mentions = Some(mentions);
        self
    }

    /// Create a new thread named `name` (forum channels only).
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = non_blank(name.into());
        self
    }

    /// True when there is no content, no embed and no attachment.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.embeds.is_empty() && self.attachments.is_empty()
    }

    pub fn build(self) -> Result<Message, BuildError> {
        let len = self.content.chars().count();
        if len > MAX_CONTENT_LENGTH {
            return Err(BuildError::ContentTooLong {
                len,
                max: MAX_CONTENT_LENGTH,
            });
        }
        if self.embeds.len() > MAX_EMBEDS {
            return Err(BuildError::TooManyEmbeds {
                len: self.embeds.len(),
                max: MAX_EMBEDS,
            });
        }
        if self.attachments.len() > MAX_FILES {
            return Err(BuildError::TooManyAttachments {
                len: self.attachments.len(),
                max: MAX_FILES,
            });
        }
        if self.is_empty() {
            return Err(BuildError::EmptyMessage);
        }

        Ok(Message {
            content: Some(self.content).filter(|c| !c.is_empty()),
            embeds: self.embeds,
            attachments: self.attachments,
            username: self.username,
            avatar_url: self.avatar_url,
            tts: self.tts,
            flags: self.flags,
            allowed_mentions: self.allowed_mentions,
            thread_name: self.thread_name,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::embed::EmbedBuilder;
    use serde_json::{json, Value};

    fn payload(message: &Message) -> Value {
        serde_json::from_str(&message.to_json(&AllowedMentions::all()).unwrap()).unwrap()
    }

    #[test]
    fn text_message_wire_shape() {
        let message = MessageBuilder::new()
            .content("hello")
            .username("  ci bot ")
            .avatar_url("   ")
            .build()
            .unwrap();

        assert_eq!(
            payload(&message),
            json!({
                "content": "hello",
                "embeds": [],
                "username": "ci bot",
                "tts": false,
                "allowed_mentions": { "parse": ["users", "roles", "everyone"] },
                "flags": 0
            })
        );
    }

    #[test]
    fn content_limit_counts_characters() {
        assert!(Message::text("a".repeat(2000)).is_ok());
        assert_eq!(
            Message::text("a".repeat(2001)).unwrap_err(),
            BuildError::ContentTooLong { len: 2001, max: 2000 }
        );
        // 2000 multi-byte characters are still 2000 characters.
        assert!(Message::text("é".repeat(2000)).is_ok());
    }

    #[test]
    fn empty_message_is_rejected() {
        assert_eq!(MessageBuilder::new().build().unwrap_err(), BuildError::EmptyMessage);
        assert_eq!(Message::text("   ").unwrap_err(), BuildError::EmptyMessage);
    }

    #[test]
    fn embed_and_file_limits() {
        let embed = EmbedBuilder::new().description("x").build().unwrap();
        let too_many = MessageBuilder::new().embeds(std::iter::repeat(embed).take(11));
        assert_eq!(
            too_many.build().unwrap_err(),
            BuildError::TooManyEmbeds { len: 11, max: 10 }
        );

        let files = (0..11).fold(MessageBuilder::new(), |b, i| b.file(format!("{i}.txt"), vec![1]));
        assert_eq!(
            files.build().unwrap_err(),
            BuildError::TooManyAttachments { len: 11, max: 10 }
        );
    }

    #[test]
    fn ephemeral_copy_leaves_original_untouched() {
        let message = Message::text("hi").unwrap();
        let ephemeral = message.with_ephemeral(true);
        assert!(!message.is_ephemeral());
        assert!(ephemeral.is_ephemeral());
        assert_eq!(payload(&ephemeral)["flags"], json!(64));
        assert!(!ephemeral.with_ephemeral(false).is_ephemeral());
    }

    #[test]
    fn own_allowed_mentions_override_default() {
        let message = MessageBuilder::new()
            .content("<@1>")
            .allowed_mentions(AllowedMentions::none())
            .thread_name("incident")
            .build()
            .unwrap();
        let value = payload(&message);
        assert_eq!(value["allowed_mentions"], json!({ "parse": [] }));
        assert_eq!(value["thread_name"], json!("incident"));
    }

    #[test]
    fn file_message_encodes_as_multipart() {
        let message = MessageBuilder::new()
            .content("see attached")
            .file("a.txt", b"alpha".to_vec())
            .file("b.txt", b"beta".to_vec())
            .build()
            .unwrap();
        let body = message.encode(&AllowedMentions::all()).unwrap();

        assert!(body.content_type.starts_with("multipart/form-data; boundary="));
        let text = String::from_utf8(body.bytes).unwrap();
        let payload_at = text.find("name=\"payload_json\"").unwrap();
        let file0_at = text.find("name=\"file0\"; filename=\"a.txt\"").unwrap();
        let file1_at = text.find("name=\"file1\"; filename=\"b.txt\"").unwrap();
        assert!(payload_at < file0_at && file0_at < file1_at);
        assert!(text.contains("\"content\":\"see attached\""));
    }

    #[test]
    fn text_message_encodes_as_json() {
        let body = Message::text("hi").unwrap().encode(&AllowedMentions::none()).unwrap();
        assert_eq!(body.content_type, "application/json");
        let value: Value = serde_json::from_slice(&body.bytes).unwrap();
        assert_eq!(value["content"], json!("hi"));
    }

    #[test]
    fn embed_only_message_omits_content() {
        let embed = EmbedBuilder::new().title("t").build().unwrap();
        let message = Message::embeds([embed]).unwrap();
        let value = payload(&message);
        assert!(value.get("content").is_none());
        assert_eq!(value["embeds"][0]["title"], json!("t"));
    }

    #[test]
    fn from_received_copies_author_and_embeds() {
        let received = ReceivedMessage::from_slice(
            br#"{
                "id": "1", "channel_id": "2", "content": "original", "flags": 64,
                "author": { "id": "3", "username": "hooky", "avatar": "abc" },
                "embeds": [{ "description": "kept" }, { "video": { "url": "https://v" } }]
            }"#,
        )
        .unwrap();

        let message = Message::from_received(&received).unwrap();
        assert_eq!(message.content(), Some("original"));
        assert_eq!(message.username(), Some("hooky"));
        assert_eq!(
            message.avatar_url(),
            Some("https://cdn.discordapp.com/avatars/3/abc.png")
        );
        assert!(message.is_ephemeral());
        assert_eq!(message.embed_list().len(), 1);
    }
}
