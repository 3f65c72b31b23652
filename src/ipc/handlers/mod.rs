pub mod comments;
pub mod core;
pub mod documents;
pub mod reactions;
pub mod realtime;
