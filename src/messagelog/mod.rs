//! Message log: reports for deleted and edited messages, delivered through a
//! bounded queue to per-guild rotating log channels.

pub mod formatter;
pub mod handlers;
pub mod payload;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod reports;
pub mod rotator;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use handlers::{GuildFilter, LogEventHandlers};
pub use pipeline::MessageLog;
pub use reports::{BulkDeletedMessages, DeletedMessage, EditedMessage};
pub use transport::SerenityTransport;
