pub mod events;
pub mod messages;

pub use events::{AckStatus, OutgoingMessage};
pub use messages::{Command, CommandParseError, IncomingMessage};
