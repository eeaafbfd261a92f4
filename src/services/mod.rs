// Pricing core
pub mod aggregator;
pub mod pricing;

// Catalog access
pub mod catalog_import;
pub mod catalog_index;

// Templates and reports
pub mod matrix;
pub mod template_resolver;

// Quote lifecycle
pub mod bulk_discount;
pub mod line_items;
pub mod quote_materializer;
pub mod quotes;

// Shared infrastructure
pub mod quote_locks;
pub mod quote_number;
pub mod settings;

pub use aggregator::{QuoteDetails, QuoteTotals};
pub use bulk_discount::{BulkDiscountService, DiscountPreset, UniformDiscountInput};
pub use catalog_import::{CatalogImportBatch, CatalogImportService, CatalogImportSummary};
pub use catalog_index::{CatalogIndex, CatalogLookup};
pub use line_items::{AddQuoteItemInput, LineItemService, UpdateQuoteItemInput};
pub use matrix::{MaintenanceMatrix, MatrixBuilder};
pub use quote_locks::QuoteLockRegistry;
pub use quote_materializer::{CreateQuoteInput, MaterializedQuote, QuoteMaterializer};
pub use quote_number::{DailySequenceGenerator, QuoteNumberGenerator};
pub use quotes::{QuoteService, SetQuoteDiscountInput};
pub use settings::SettingsStore;
pub use template_resolver::{ReferenceGap, ResolvedTemplate, TemplateResolver};
