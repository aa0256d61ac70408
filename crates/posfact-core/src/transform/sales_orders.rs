use super::schema::{ColumnKind::*, ColumnMapping, DerivedColumn, FactSchema};

/// One row per ordered item within a sale.
pub static SALES_ORDERS_SCHEMA: FactSchema = FactSchema {
    fact_name: "sales_orders",
    code: "fact_sales_orders_v1",
    columns: &[
        ColumnMapping::new("id", "order_key", Identifier),
        ColumnMapping::new("attributes.canceled", "canceled", Text),
        ColumnMapping::new(
            "attributes.cancellationComment",
            "cancellation_comment",
            Text,
        ),
        ColumnMapping::new("attributes.comment", "comments", Text),
        ColumnMapping::new("attributes.price", "total_price", Money),
        ColumnMapping::new("attributes.quantity", "quantity_ordered", NullableInteger),
        ColumnMapping::new("attributes.status", "status", Text),
        ColumnMapping::new("attributes.paid", "paid", Text),
        ColumnMapping::new("relationships.product.data.id", "product_key", NullableInteger),
        ColumnMapping::new("relationships.subitems.data", "subitems_data", Text),
        ColumnMapping::new(
            "relationships.priceList.data.id",
            "price_list_key",
            NullableInteger,
        ),
        ColumnMapping::new("relationships.sale.data.id", "sales_key", NullableInteger),
        ColumnMapping::new("attributes.createdAt", "created", Timestamp),
    ],
    derived: &[DerivedColumn::Ratio {
        target: "unit_price",
        numerator: "total_price",
        denominator: "quantity_ordered",
    }],
};
