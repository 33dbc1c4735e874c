pub(crate) mod client;
pub(crate) mod parser;

pub use client::FeedClient;
pub use parser::{EntryOutcome, SkipReason, parse_feed};
