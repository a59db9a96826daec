//! Log reports for deleted and edited messages.
//!
//! Every function here is pure: it takes the event data plus the current time
//! and returns the payloads to post, in posting order.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, MessageId};

use crate::common::types::snowflake_timestamp;
use crate::common::{MessageAuthor, MessageSnapshot, ReactionEmoji};

use super::formatter::{
    channel_mention, format_timestamp, placement, split_content, user_mention, Placement,
    DUAL_MESSAGE_LIMIT, SINGLE_MESSAGE_LIMIT,
};
use super::payload::{LogEmbed, LogFile, LogPayload, COLOUR_BLURPLE, COLOUR_NEGATIVE};

/// Attachment name for content of the previous (or deleted) message version.
pub const OLD_CONTENT_FILE: &str = "old.md";

/// Attachment name for content of the edited message version.
pub const NEW_CONTENT_FILE: &str = "new.md";

/// Attachment name for bulk deletion reports.
pub const BULK_REPORT_FILE: &str = "messages.md";

/// A single message was deleted.
#[derive(Debug, Clone)]
pub struct DeletedMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// The message as last seen, if it was cached.
    pub cached: Option<MessageSnapshot>,
}

/// Several messages were deleted at once.
#[derive(Debug, Clone)]
pub struct BulkDeletedMessages {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_ids: Vec<MessageId>,
    /// Whichever of the deleted messages were cached.
    pub cached: Vec<MessageSnapshot>,
}

impl BulkDeletedMessages {
    /// Every deleted message id, oldest first and without duplicates,
    /// including cached messages the event didn't list.
    pub fn deleted_ids(&self) -> BTreeSet<MessageId> {
        self.message_ids
            .iter()
            .copied()
            .chain(self.cached.iter().map(|m| m.id))
            .collect()
    }
}

/// A message was edited.
#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub guild_id: GuildId,
    /// Previous version, if it was cached.
    pub old: Option<MessageSnapshot>,
    pub new: MessageSnapshot,
}

/// Whether an edit touched the message text.
///
/// Without a cached previous version this can't be known, so it counts as
/// changed.
pub fn content_changed(old: Option<&MessageSnapshot>, new: &MessageSnapshot) -> bool {
    old.map_or(true, |old| old.content != new.content)
}

/// Add the metadata fields shared by delete and edit reports.
fn add_message_fields(embed: LogEmbed, message: &MessageSnapshot) -> LogEmbed {
    let mut embed = embed
        .with_footer(message.id.to_string())
        .field("URL", message.jump_url(), false);

    embed = match &message.author {
        MessageAuthor::User { id, tag } => embed
            .field("Author Mention", user_mention(*id), true)
            .field("Author ID/Tag", format!("`{}` / `{}`", id, tag), true),
        MessageAuthor::Webhook {
            webhook_id,
            username,
        } => embed.field("Message Username", username.clone(), true).field(
            "Webhook ID",
            webhook_id.map_or_else(|| "N/A".to_string(), |id| id.to_string()),
            true,
        ),
    };

    embed = embed
        .field("Channel", channel_mention(message.channel_id), true)
        .field("Sent", format_timestamp(&message.timestamp), true);

    if let Some(edited) = &message.edited_timestamp {
        embed = embed.field("Last Edited", format_timestamp(edited), true);
    }
    if !message.attachments.is_empty() {
        embed = embed.field("Attachments", message.attachments.len().to_string(), true);
    }
    if !message.embeds.is_empty() {
        embed = embed.field("Embeds", message.embeds.len().to_string(), true);
    }
    if message.reaction_total() > 0 {
        embed = embed.field("Reactions", message.reaction_total().to_string(), true);
    }

    embed
}

fn with_notes(embed: LogEmbed, notes: &[&str]) -> LogEmbed {
    if notes.is_empty() {
        embed
    } else {
        embed.with_description(notes.join("\n"))
    }
}

fn inline_section(heading: &str, content: &str) -> String {
    if content.is_empty() {
        format!("**{}**\n\n_No text content._", heading)
    } else {
        format!("**{}**\n\n{}", heading, content)
    }
}

/// Build the report for a single deleted message.
///
/// Returns the main entry, followed by an `old.md` upload when the content
/// is too long to show inline.
pub fn deletion_report(event: &DeletedMessage, now: DateTime<Utc>) -> Vec<LogPayload> {
    let embed = LogEmbed::new("Message deleted", COLOUR_NEGATIVE).with_timestamp(now);

    let Some(message) = &event.cached else {
        let created = snowflake_timestamp(event.message_id.get());
        let embed = embed
            .with_description(
                "**Note:** Message was not cached, so its content and author are not available.",
            )
            .field("Channel", channel_mention(event.channel_id), true)
            .field("Created", format_timestamp(&created), true)
            .with_footer(event.message_id.to_string());

        return vec![LogPayload::embed(embed)];
    };

    let embed = add_message_fields(embed, message);

    if message.content.is_empty() {
        let embed = with_notes(embed, &["Message had no text content."]);
        return vec![LogPayload::embed(embed)];
    }

    match placement(&message.content, SINGLE_MESSAGE_LIMIT) {
        Placement::Inline => vec![LogPayload::embed(embed)
            .with_content(inline_section("Message Content", &message.content))],
        Placement::Attached => {
            let embed = with_notes(
                embed,
                &["**Note:** Message content was too long to show here, so it has been attached as `old.md`."],
            );
            vec![
                LogPayload::embed(embed),
                LogPayload::file(LogFile::new(
                    OLD_CONTENT_FILE,
                    split_content(&message.content),
                )),
            ]
        }
    }
}

/// Build the report for an edited message.
///
/// Returns nothing when the text didn't change. Otherwise the main entry,
/// followed by one upload carrying whichever side was too long to inline.
pub fn edit_report(event: &EditedMessage, now: DateTime<Utc>) -> Vec<LogPayload> {
    let new = &event.new;

    if !content_changed(event.old.as_ref(), new) {
        return Vec::new();
    }

    let mut sections = Vec::new();
    let mut files = Vec::new();
    let mut notes = Vec::new();

    match &event.old {
        Some(old) => match placement(&old.content, DUAL_MESSAGE_LIMIT) {
            Placement::Inline => sections.push(inline_section("Old Message Content", &old.content)),
            Placement::Attached => {
                notes.push("Old content was too long to show here, so it has been attached as `old.md`.");
                files.push(LogFile::new(OLD_CONTENT_FILE, split_content(&old.content)));
            }
        },
        None => {
            notes.push("**Note:** Message was not cached, so the content may not have been edited.");
        }
    }

    match placement(&new.content, DUAL_MESSAGE_LIMIT) {
        Placement::Inline => sections.push(inline_section("New Message Content", &new.content)),
        Placement::Attached => {
            notes.push("New content was too long to show here, so it has been attached as `new.md`.");
            files.push(LogFile::new(NEW_CONTENT_FILE, split_content(&new.content)));
        }
    }

    let embed = LogEmbed::new("Message edited", COLOUR_BLURPLE).with_timestamp(now);
    let embed = with_notes(add_message_fields(embed, new), &notes);

    let mut primary = LogPayload::embed(embed);
    if !sections.is_empty() {
        primary.content = Some(sections.join("\n\n"));
    }

    let mut payloads = vec![primary];
    if !files.is_empty() {
        payloads.push(LogPayload::files(files));
    }
    payloads
}

fn write_cached_entry(out: &mut String, message: &MessageSnapshot) -> std::fmt::Result {
    match &message.author {
        MessageAuthor::User { id, tag } => {
            writeln!(out, "**Author:** {}", tag)?;
            writeln!(out, "**Author ID:** {}\n", id)?;
        }
        MessageAuthor::Webhook {
            webhook_id,
            username,
        } => {
            writeln!(out, "**Display Name:** {}", username)?;
            match webhook_id {
                Some(id) => writeln!(out, "**Webhook ID:** {}\n", id)?,
                None => writeln!(out, "**Webhook ID:** N/A\n")?,
            }
        }
    }

    writeln!(out, "**Sent:** {}", format_timestamp(&message.timestamp))?;
    if let Some(edited) = &message.edited_timestamp {
        writeln!(out, "**Last Edited:** {}", format_timestamp(edited))?;
    }
    out.push('\n');

    if !message.content.is_empty() {
        write!(out, "## Content\n\n{}\n\n", split_content(&message.content))?;
    }

    if !message.reactions.is_empty() {
        out.push_str("## Reactions\n\n");

        let mut reactions: Vec<_> = message.reactions.iter().collect();
        reactions.sort_by_key(|r| r.count);

        for reaction in reactions {
            write!(out, "{:>5} | {}", reaction.count, reaction.emoji.name())?;
            if let ReactionEmoji::Custom { id, .. } = &reaction.emoji {
                write!(out, " (`{}`)", id)?;
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !message.attachments.is_empty() {
        out.push_str("## Attachments\n\n");

        for attachment in &message.attachments {
            writeln!(out, "**Filename:** {}", attachment.filename)?;
            writeln!(out, "**Size (Bytes):** {}\n", attachment.size)?;
            writeln!(out, "**URL:** {}", attachment.url)?;
            writeln!(out, "**Proxy URL:** {}\n", attachment.proxy_url)?;
            writeln!(out, "**Image:** {}", attachment.is_image)?;
            writeln!(out, "**Spoiler:** {}\n", attachment.is_spoiler)?;
        }
    }

    if !message.embeds.is_empty() {
        out.push_str("## Embeds\n\n");

        for embed in &message.embeds {
            let json = serde_json::to_string_pretty(embed).unwrap_or_else(|_| embed.to_string());
            write!(out, "```json\n{}\n```\n\n", json)?;
        }
    }

    Ok(())
}

/// Render the markdown document listing every message of a bulk deletion.
///
/// Messages are listed oldest first; ones that weren't cached are listed by
/// id with a note.
pub fn render_bulk_document(event: &BulkDeletedMessages) -> String {
    let by_id: HashMap<MessageId, &MessageSnapshot> =
        event.cached.iter().map(|m| (m.id, m)).collect();

    let ids = event.deleted_ids();

    let mut out = format!("# Deleted Messages ({})\n\n", ids.len());

    if event.cached.is_empty() {
        out.push_str("**No messages were cached.**\n\n");
    }

    for id in ids {
        let _ = write!(out, "**ID:** {}\n\n", id);

        match by_id.get(&id) {
            // Writing into a String can't fail
            Some(message) => {
                let _ = write_cached_entry(&mut out, message);
            }
            None => {
                out.push_str("_Message was not cached, so further information is not available._\n\n");
            }
        }

        out.push_str("---\n\n");
    }

    out
}

/// Build the report for a bulk deletion: the full document first, then a
/// short summary embed.
pub fn bulk_deletion_report(event: &BulkDeletedMessages, now: DateTime<Utc>) -> Vec<LogPayload> {
    let document = render_bulk_document(event);

    let summary = LogEmbed::new("Bulk message delete", COLOUR_NEGATIVE)
        .with_timestamp(now)
        .field("Channel", channel_mention(event.channel_id), true)
        .field("Count", event.deleted_ids().len().to_string(), true);

    vec![
        LogPayload::file(LogFile::new(BULK_REPORT_FILE, document)),
        LogPayload::embed(summary),
    ]
}
