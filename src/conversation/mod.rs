//! Conversation module: the listen/capture/answer/speak cycle
//!
//! Four modes, always returning to Passive:
//! - Passive: listening for the wake phrase
//! - Capturing: recording one command
//! - Processing: waiting on the answer service
//! - Speaking: speaking the reply, then cooling down

mod machine;
mod state;

pub use machine::{Conversation, ConversationHandle};
pub use state::{Message, Mode, Snapshot};
