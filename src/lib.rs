//! modwatch — keyword moderation for group chats.

pub mod cards;
pub mod channels;
pub mod config;
pub mod error;
pub mod keywords;
pub mod normalize;
pub mod pipeline;
pub mod wordlist;
