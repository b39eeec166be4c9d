//! Webhook message types.
//!
//! | Module | Contents |
//! |---|---|
//! | [`message`] | [`Message`], [`MessageBuilder`], [`MessageFlags`], attachments |
//! | [`embed`] | [`Embed`], [`EmbedBuilder`] and its parts |
//! | [`mentions`] | [`AllowedMentions`] allow-list |
//! | [`received`] | Read-only types deserialized from server responses |
//!
//! Everything sendable is immutable once built. Builders validate in
//! `build()` and return a [`BuildError`](crate::error::BuildError).

pub mod embed;
pub mod mentions;
pub mod message;
pub mod received;

pub use embed::{Embed, EmbedAuthor, EmbedBuilder, EmbedField, EmbedFooter, MAX_FIELDS};
pub use mentions::AllowedMentions;
pub use message::{
    Message, MessageAttachment, MessageBuilder, MessageFlags, MAX_CONTENT_LENGTH, MAX_EMBEDS,
    MAX_FILES,
};
pub use received::{
    EmbedImage, EmbedProvider, EmbedVideo, ReceivedAttachment, ReceivedEmbed, ReceivedMessage,
    ReceivedUser,
};
