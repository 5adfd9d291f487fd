//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Cached product listings, details, categories and settings
//! - `cart` - Guest and signed-in carts, reconciled against live stock
//! - `checkout` - Coupons, totals preview and order placement
//! - `stock` - Background stock poller and change broadcaster
//! - `chat` - Shopping assistant and recipe ideas
//! - `gemini` - Gemini API client used by `chat`

pub mod cart;
pub mod catalog;
pub mod chat;
pub mod checkout;
pub mod gemini;
pub mod stock;

pub use cart::{CartItem, CartService, CartServiceError, CartSnapshot};
pub use catalog::CatalogService;
pub use chat::{ChatError, ChatStreamEvent, ChatTurn, RecipeIdea};
pub use checkout::{AppliedCoupon, CheckoutError, CheckoutForm, CheckoutPreview, CheckoutService};
pub use stock::StockWatcher;
