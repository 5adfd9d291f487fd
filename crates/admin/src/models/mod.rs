//! Types the admin panel keeps in the session.

pub mod session;

pub use session::{CurrentAdmin, Flash, FlashKind, keys};
