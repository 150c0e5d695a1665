pub mod comment;
pub mod poll;
pub mod post;
pub mod side_vote;
pub mod vote;

pub use comment::*;
pub use poll::*;
pub use post::*;
pub use side_vote::*;
pub use vote::*;
