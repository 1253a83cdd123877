// Operator console: chat listing, transcripts, flags, tags and stats.

pub mod handlers;
pub mod queries;
