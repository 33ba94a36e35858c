//! API Request and Response Types

// Card types
mod card;
pub use card::*;

// Health types
mod health;
pub use health::*;
