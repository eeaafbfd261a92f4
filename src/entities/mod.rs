pub mod app_setting;
pub mod catalog_part;
pub mod labor_operation;
pub mod maintenance_template;
pub mod quote;
pub mod quote_item;
pub mod template_item;

pub use quote::{DiscountType, QuoteStatus};
pub use quote_item::DiscountSource;
pub use template_item::ItemType;
