//! Outbound log payloads.
//!
//! A payload is a plain value describing one Discord message: optional text,
//! optional embed and any number of file attachments. Reports are built as
//! payloads and only converted to serenity builders by the transport.

use chrono::{DateTime, Utc};
use serenity::model::id::GuildId;

/// Embed colour for deletions.
pub const COLOUR_NEGATIVE: u32 = 0xE7_4C_3C;

/// Embed colour for edits.
pub const COLOUR_BLURPLE: u32 = 0x72_89_DA;

/// A single embed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Embed attached to a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEmbed {
    pub title: String,
    pub description: Option<String>,
    pub colour: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

impl LogEmbed {
    pub fn new(title: impl Into<String>, colour: u32) -> Self {
        Self {
            title: title.into(),
            colour,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Look up a field value by name.
    #[cfg(test)]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// A file uploaded alongside a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl LogFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// File contents as text (log files are always UTF-8 markdown).
    #[cfg(test)]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Everything needed to post one Discord message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogPayload {
    pub content: Option<String>,
    pub embed: Option<LogEmbed>,
    pub files: Vec<LogFile>,
}

impl LogPayload {
    pub fn embed(embed: LogEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn file(file: LogFile) -> Self {
        Self {
            files: vec![file],
            ..Default::default()
        }
    }

    pub fn files(files: Vec<LogFile>) -> Self {
        Self {
            files,
            ..Default::default()
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// A payload with nothing to post.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty)
            && self.embed.is_none()
            && self.files.is_empty()
    }

    /// Find an attachment by filename.
    #[cfg(test)]
    pub fn find_file(&self, filename: &str) -> Option<&LogFile> {
        self.files.iter().find(|f| f.filename == filename)
    }
}

/// One unit of work travelling through the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub guild_id: GuildId,
    pub payload: LogPayload,
}

impl LogMessage {
    pub fn new(guild_id: GuildId, payload: LogPayload) -> Self {
        Self { guild_id, payload }
    }
}
