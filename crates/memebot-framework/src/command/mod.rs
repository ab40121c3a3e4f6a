//! Command parsing.
//!
//! Turns an [`Update`](memebot_core::Update) into a [`ParsedCommand`]. Three
//! update shapes are recognised:
//!
//! - text (or a photo caption) starting with `/token`, optionally `/token@botname`
//! - an inline button press whose data reads `TOKEN:arg:arg`
//! - bare image attachments, which continue a held conversation
//!
//! ```rust,ignore
//! let parser = CommandParser::new().with_bot_username("memebot");
//! match parser.parse(&update) {
//!     Parsed::Command(cmd) => assert_eq!(cmd.token, "fortune"),
//!     Parsed::Continuation(attachments) => { /* route to the conversation holder */ }
//!     Parsed::Ignored => {}
//! }
//! ```

pub(crate) mod parser;
mod split;

pub use parser::{CommandParser, Parsed, ParsedCommand};
pub use split::shell_split;
