pub mod common;
pub mod health;
pub mod quotes;
pub mod templates;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        BulkDiscountService, CatalogImportService, DailySequenceGenerator, LineItemService,
        MatrixBuilder, QuoteLockRegistry, QuoteMaterializer, QuoteNumberGenerator, QuoteService,
        SettingsStore, TemplateResolver,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates the pricing logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub settings: SettingsStore,
    pub locks: QuoteLockRegistry,
    pub resolver: Arc<TemplateResolver>,
    pub materializer: Arc<QuoteMaterializer>,
    pub quotes: Arc<QuoteService>,
    pub line_items: Arc<LineItemService>,
    pub bulk_discount: Arc<BulkDiscountService>,
    pub matrix: Arc<MatrixBuilder>,
    pub catalog_import: Arc<CatalogImportService>,
}

impl AppServices {
    /// Wires every service over one pool, one event channel and one lock registry.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let numbers: Arc<dyn QuoteNumberGenerator> = Arc::new(DailySequenceGenerator::new(
            config.quote_number_prefix.clone(),
        ));
        Self::with_number_generator(db_pool, event_sender, config, numbers)
    }

    pub fn with_number_generator(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        numbers: Arc<dyn QuoteNumberGenerator>,
    ) -> Self {
        let settings = SettingsStore::new(db_pool.clone(), config.clone());
        let locks = QuoteLockRegistry::new();

        let resolver = Arc::new(TemplateResolver::new(db_pool.clone()));
        let materializer = Arc::new(QuoteMaterializer::new(
            db_pool.clone(),
            event_sender.clone(),
            settings.clone(),
            numbers,
        ));
        let quotes = Arc::new(QuoteService::new(
            db_pool.clone(),
            event_sender.clone(),
            locks.clone(),
        ));
        let line_items = Arc::new(LineItemService::new(
            db_pool.clone(),
            event_sender.clone(),
            locks.clone(),
        ));
        let bulk_discount = Arc::new(BulkDiscountService::new(
            db_pool.clone(),
            event_sender.clone(),
            locks.clone(),
            settings.clone(),
        ));
        let matrix = Arc::new(MatrixBuilder::new(db_pool.clone()));
        let catalog_import = Arc::new(CatalogImportService::new(
            db_pool,
            event_sender,
            &config,
        ));

        Self {
            settings,
            locks,
            resolver,
            materializer,
            quotes,
            line_items,
            bulk_discount,
            matrix,
            catalog_import,
        }
    }
}
