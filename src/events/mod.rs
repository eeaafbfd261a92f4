use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    ///
    /// Events are emitted after commit, so a delivery failure must not turn a
    /// successful mutation into an error.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
            counter!("pricing.events.dropped", 1);
        }
    }
}

/// Quote and catalog domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    QuoteCreated {
        quote_id: Uuid,
        quote_no: String,
        template_id: Option<Uuid>,
        grand_total: Decimal,
        gap_count: usize,
    },
    QuoteItemAdded {
        quote_id: Uuid,
        item_id: Uuid,
    },
    QuoteItemUpdated {
        quote_id: Uuid,
        item_id: Uuid,
    },
    QuoteItemRemoved {
        quote_id: Uuid,
        item_id: Uuid,
    },
    QuoteDiscountApplied {
        quote_id: Uuid,
        /// "quote", "uniform" or the preset name
        kind: String,
    },
    QuoteTaxRateChanged {
        quote_id: Uuid,
        tax_rate: Decimal,
    },
    QuoteFinalized {
        quote_id: Uuid,
        grand_total: Decimal,
        at: DateTime<Utc>,
    },
    QuoteCancelled {
        quote_id: Uuid,
        at: DateTime<Utc>,
    },
    CatalogImported {
        brand_id: Uuid,
        parts: usize,
        labor_operations: usize,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::QuoteCreated { .. } => "quote_created",
            Event::QuoteItemAdded { .. } => "quote_item_added",
            Event::QuoteItemUpdated { .. } => "quote_item_updated",
            Event::QuoteItemRemoved { .. } => "quote_item_removed",
            Event::QuoteDiscountApplied { .. } => "quote_discount_applied",
            Event::QuoteTaxRateChanged { .. } => "quote_tax_rate_changed",
            Event::QuoteFinalized { .. } => "quote_finalized",
            Event::QuoteCancelled { .. } => "quote_cancelled",
            Event::CatalogImported { .. } => "catalog_imported",
        }
    }
}

/// Consumes domain events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("pricing.events.processed", 1, "event" => event.name());

        match &event {
            Event::QuoteCreated {
                quote_id,
                quote_no,
                gap_count,
                ..
            } if *gap_count > 0 => {
                warn!(
                    %quote_id,
                    quote_no = %quote_no,
                    gap_count,
                    "Quote created with unresolved template references"
                );
            }
            Event::CatalogImported {
                brand_id,
                parts,
                labor_operations,
            } => {
                info!(%brand_id, parts, labor_operations, "Catalog import finished");
            }
            other => {
                info!(event = other.name(), payload = ?other, "Domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}
