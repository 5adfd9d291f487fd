//! Live stock updates as server-sent events.
//!
//! Every subscriber gets each [`StockChange`] as a `stock` event. When a
//! change affects the viewer's own cart, a `cart` event follows with the
//! sentences to show, so an open cart page can refresh itself.

use std::collections::HashMap;
use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tower_sessions::Session;
use tracing::instrument;
use verdant_core::ProductId;
use verdant_core::cart::{CartLine, StockChange};

use crate::middleware::OptionalAuth;
use crate::services::CartService;
use crate::services::cart::{adjustments_for_change, describe_adjustment};
use crate::state::AppState;

/// Body of a `cart` event.
#[derive(Debug, Serialize)]
struct CartNotice {
    messages: Vec<String>,
}

fn stock_event(change: &StockChange) -> Event {
    Event::default()
        .event("stock")
        .data(serde_json::to_string(change).unwrap_or_default())
}

/// `cart` event for a change, if it touches the watched lines.
fn cart_event(
    lines: &mut Vec<CartLine>,
    names: &HashMap<ProductId, String>,
    change: StockChange,
) -> Option<Event> {
    let messages: Vec<String> = adjustments_for_change(lines, change)
        .iter()
        .map(|adj| describe_adjustment(adj, names.get(&adj.product_id()).map(String::as_str)))
        .collect();
    if messages.is_empty() {
        return None;
    }
    let body = serde_json::to_string(&CartNotice { messages }).unwrap_or_default();
    Some(Event::default().event("cart").data(body))
}

/// Stream stock changes to the browser.
#[instrument(skip_all)]
pub async fn stock(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe first so nothing published while the cart loads is missed.
    let mut receiver = state.stock().subscribe();

    let snapshot = CartService::new(state.backend(), &session, customer.as_ref())
        .snapshot()
        .await
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "No cart to watch for stock events");
            crate::services::CartSnapshot::default()
        });
    let mut lines = snapshot.lines();
    let names: HashMap<ProductId, String> = snapshot
        .items
        .into_iter()
        .map(|item| (item.product.id, item.product.name))
        .collect();

    let events = stream! {
        loop {
            match receiver.recv().await {
                Ok(change) => {
                    yield Ok(stock_event(&change));
                    if let Some(event) = cart_event(&mut lines, &names, change) {
                        yield Ok(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Stock subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_event_only_for_watched_products() {
        let mut lines = vec![CartLine::new(ProductId::new(1), 2)];
        let names = HashMap::from([(ProductId::new(1), "Raw Honey".to_string())]);

        let unrelated = StockChange {
            product_id: ProductId::new(2),
            stock: 0,
        };
        assert!(cart_event(&mut lines, &names, unrelated).is_none());

        let sold_out = StockChange {
            product_id: ProductId::new(1),
            stock: 0,
        };
        assert!(cart_event(&mut lines, &names, sold_out).is_some());
        assert!(lines.is_empty());
    }
}
