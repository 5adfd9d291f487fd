//! Types the storefront keeps in the session.

pub mod session;

pub use session::{CurrentCustomer, Flash, FlashKind, session_keys};
