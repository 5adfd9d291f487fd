//! Table operations, one module per table.
//!
//! Each module adds methods to [`crate::BackendClient`]. Calls that act on
//! behalf of a customer take their access token so row-level security
//! applies; admin-only calls run with the client's own key.

pub mod cart;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod profiles;
pub mod settings;
pub mod wishlist;
