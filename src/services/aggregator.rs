use crate::{
    entities::{quote, quote_item, DiscountType, ItemType},
    errors::ServiceError,
    services::pricing::{clamp_pct, HUNDRED},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::debug;

/// Header totals derived from a quote's items and its discount/tax settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteTotals {
    pub parts_subtotal: Decimal,
    pub labor_subtotal: Decimal,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
}

impl QuoteTotals {
    /// Computes totals from `(item_type, total_price)` pairs.
    ///
    /// Tax is charged on the discounted base. An AMOUNT discount never exceeds
    /// the subtotal and a PERCENT discount is clamped into `[0, 100]`.
    pub fn compute<I>(
        lines: I,
        discount_type: DiscountType,
        discount_value: Decimal,
        tax_rate: Decimal,
    ) -> Self
    where
        I: IntoIterator<Item = (ItemType, Decimal)>,
    {
        let (parts_subtotal, labor_subtotal) = lines.into_iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(parts, labor), (item_type, total)| match item_type {
                ItemType::Part => (parts + total, labor),
                ItemType::Labor => (parts, labor + total),
            },
        );
        let subtotal = parts_subtotal + labor_subtotal;

        let discount_amount = match discount_type {
            DiscountType::None => Decimal::ZERO,
            DiscountType::Percent => subtotal * clamp_pct(discount_value) / HUNDRED,
            DiscountType::Amount => discount_value.max(Decimal::ZERO).min(subtotal),
        };

        let taxable = subtotal - discount_amount;
        let tax_amount = taxable * tax_rate / HUNDRED;

        Self {
            parts_subtotal,
            labor_subtotal,
            subtotal,
            discount_amount,
            tax_amount,
            grand_total: taxable + tax_amount,
        }
    }

    pub fn from_items(
        items: &[quote_item::Model],
        discount_type: DiscountType,
        discount_value: Decimal,
        tax_rate: Decimal,
    ) -> Self {
        Self::compute(
            items.iter().map(|item| (item.item_type, item.total_price)),
            discount_type,
            discount_value,
            tax_rate,
        )
    }

    /// True when the stored header already carries these totals.
    pub fn matches(&self, header: &quote::Model) -> bool {
        header.parts_subtotal == self.parts_subtotal
            && header.labor_subtotal == self.labor_subtotal
            && header.subtotal == self.subtotal
            && header.discount_amount == self.discount_amount
            && header.tax_amount == self.tax_amount
            && header.grand_total == self.grand_total
    }
}

/// A quote header together with its items ordered by `sort_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteDetails {
    pub quote: quote::Model,
    pub items: Vec<quote_item::Model>,
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    quote_id: uuid::Uuid,
) -> Result<Vec<quote_item::Model>, ServiceError> {
    Ok(quote_item::Entity::find()
        .filter(quote_item::Column::QuoteId.eq(quote_id))
        .order_by_asc(quote_item::Column::SortOrder)
        .order_by_asc(quote_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Recomputes and persists the totals of `quote`.
///
/// Reads every item of the quote once and writes the header once. The write
/// also persists the caller's in-memory changes to the discount, tax rate,
/// preset and status fields, and only succeeds while the stored `version`
/// still equals `quote.version`.
pub async fn recalculate_quote_totals<C: ConnectionTrait>(
    conn: &C,
    quote: quote::Model,
) -> Result<QuoteDetails, ServiceError> {
    let items = load_items(conn, quote.id).await?;
    let totals = QuoteTotals::from_items(
        &items,
        quote.discount_type,
        quote.discount_value,
        quote.tax_rate,
    );

    let quote_id = quote.id;
    let expected_version = quote.version;

    let mut active: quote::ActiveModel = quote.clone().into();
    active.status = Set(quote.status);
    active.discount_type = Set(quote.discount_type);
    active.discount_value = Set(quote.discount_value);
    active.tax_rate = Set(quote.tax_rate);
    active.applied_preset = Set(quote.applied_preset.clone());
    active.finalized_at = Set(quote.finalized_at);
    active.cancelled_at = Set(quote.cancelled_at);
    active.parts_subtotal = Set(totals.parts_subtotal);
    active.labor_subtotal = Set(totals.labor_subtotal);
    active.subtotal = Set(totals.subtotal);
    active.discount_amount = Set(totals.discount_amount);
    active.tax_amount = Set(totals.tax_amount);
    active.grand_total = Set(totals.grand_total);
    active.version = Set(expected_version + 1);
    active.updated_at = Set(Utc::now());

    let updated = quote::Entity::update(active)
        .filter(quote::Column::Version.eq(expected_version))
        .exec(conn)
        .await
        .map_err(|e| ServiceError::from_guarded_update(e, quote_id))?;

    counter!("pricing.quote.recalculated", 1);
    debug!(
        %quote_id,
        subtotal = %totals.subtotal,
        discount = %totals.discount_amount,
        tax = %totals.tax_amount,
        grand_total = %totals.grand_total,
        version = updated.version,
        "Recalculated quote totals"
    );

    Ok(QuoteDetails {
        quote: updated,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scenario_lines() -> Vec<(ItemType, Decimal)> {
        vec![
            (ItemType::Part, dec!(185)),
            (ItemType::Part, dec!(320)),
            (ItemType::Labor, dec!(400)),
        ]
    }

    #[test]
    fn totals_without_discount() {
        let totals = QuoteTotals::compute(scenario_lines(), DiscountType::None, dec!(0), dec!(20));
        assert_eq!(totals.parts_subtotal, dec!(505));
        assert_eq!(totals.labor_subtotal, dec!(400));
        assert_eq!(totals.subtotal, dec!(905));
        assert_eq!(totals.discount_amount, dec!(0));
        assert_eq!(totals.tax_amount, dec!(181));
        assert_eq!(totals.grand_total, dec!(1086));
    }

    #[test]
    fn percent_discount_taxes_discounted_base() {
        let totals =
            QuoteTotals::compute(scenario_lines(), DiscountType::Percent, dec!(10), dec!(20));
        assert_eq!(totals.discount_amount, dec!(90.5));
        assert_eq!(totals.tax_amount, dec!(162.9));
        assert_eq!(totals.grand_total, dec!(977.4));
    }

    #[test]
    fn amount_discount_is_capped_at_subtotal() {
        let totals = QuoteTotals::compute(
            vec![(ItemType::Part, dec!(50))],
            DiscountType::Amount,
            dec!(80),
            dec!(20),
        );
        assert_eq!(totals.discount_amount, dec!(50));
        assert_eq!(totals.tax_amount, dec!(0));
        assert_eq!(totals.grand_total, dec!(0));
    }

    #[test]
    fn none_discount_ignores_stale_value() {
        let totals =
            QuoteTotals::compute(scenario_lines(), DiscountType::None, dec!(25), dec!(0));
        assert_eq!(totals.discount_amount, dec!(0));
        assert_eq!(totals.grand_total, dec!(905));
    }

    #[test]
    fn empty_quote_totals_are_zero() {
        let totals = QuoteTotals::compute(
            Vec::<(ItemType, Decimal)>::new(),
            DiscountType::Percent,
            dec!(10),
            dec!(20),
        );
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.grand_total, Decimal::ZERO);
    }
}
