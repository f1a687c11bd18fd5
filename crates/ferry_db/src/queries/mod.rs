//! Database query functions.
//!
//! Organized by domain:
//! - `mapping`: identity map and post placements
//! - `forum`: reference forum groups, users, categories, topics and posts

mod forum;
mod mapping;

pub use forum::*;
pub use mapping::*;
