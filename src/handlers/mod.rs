pub mod comments;
pub mod polls;
pub mod posts;
