use super::schema::{ColumnKind::*, ColumnMapping, DerivedColumn, FactSchema};

/// One row per closed or open sale (a table's check).
pub static SALES_SCHEMA: FactSchema = FactSchema {
    fact_name: "sales",
    code: "fact_sales_v1",
    columns: &[
        ColumnMapping::new("id", "sales_key", Identifier),
        ColumnMapping::new("attributes.comment", "comments", Text),
        ColumnMapping::new("attributes.people", "party_size", NullableInteger),
        ColumnMapping::new("attributes.total", "total_sale", Money),
        ColumnMapping::new("attributes.saleType", "sale_type", Text),
        ColumnMapping::new("attributes.saleState", "sale_state", Text),
        ColumnMapping::new("relationships.discounts.data", "discounts_data", Text),
        ColumnMapping::new("relationships.tips.data", "tips_data", Text),
        ColumnMapping::new(
            "relationships.shippingCosts.data",
            "shipping_costs_data",
            Text,
        ),
        ColumnMapping::new("relationships.table.data.id", "table_key", NullableInteger),
        ColumnMapping::new("relationships.waiter.data.id", "employee_key", NullableInteger),
        ColumnMapping::new(
            "relationships.customer.data.id",
            "customer_key",
            NullableInteger,
        ),
        ColumnMapping::new("attributes.createdAt", "start", Timestamp),
        ColumnMapping::new("attributes.closedAt", "closed", Timestamp),
    ],
    derived: &[DerivedColumn::Constant {
        target: "restaurant_key",
        value: 1,
    }],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::apply_schema;
    use polars::prelude::*;

    #[test]
    fn maps_a_sales_export() {
        let raw = df![
            "id" => ["101", "102"],
            "attributes.comment" => [None, Some("birthday")],
            "attributes.people" => [Some("4.0"), None],
            "attributes.total" => [Some("15800.50"), Some("0")],
            "attributes.saleType" => [Some("TABLE"), Some("DELIVERY")],
            "attributes.saleState" => [Some("CLOSED"), Some("PENDING")],
            "relationships.table.data.id" => [Some("12"), None],
            "relationships.waiter.data.id" => [Some("3"), Some("3")],
            "attributes.createdAt" => [Some("2024-06-01T23:10:00Z"), Some("2024-06-02T01:00:00Z")],
            "attributes.closedAt" => [Some("2024-06-02T00:40:00Z"), None],
            "meta.unused" => ["x", "y"],
        ]
        .unwrap();

        let clean = apply_schema(&raw, &SALES_SCHEMA).unwrap();

        assert_eq!(clean.width(), SALES_SCHEMA.output_columns().len());
        assert!(clean.column("meta.unused").is_err());

        let party = clean.column("party_size").unwrap().i64().unwrap();
        assert_eq!(party.get(0), Some(4));
        assert_eq!(party.get(1), None);

        let total = clean.column("total_sale").unwrap().f64().unwrap();
        assert_eq!(total.get(0), Some(15800.5));

        let start_date = clean.column("start_date_key").unwrap().i64().unwrap();
        let start_time = clean.column("start_time_key").unwrap().i64().unwrap();
        assert_eq!(start_date.get(0), Some(20240601));
        assert_eq!(start_time.get(0), Some(20 * 60 + 10));
        assert_eq!(start_date.get(1), Some(20240601));
        assert_eq!(start_time.get(1), Some(22 * 60));

        let closed = clean.column("closed_date_key").unwrap().i64().unwrap();
        assert_eq!(closed.get(0), Some(20240601));
        assert_eq!(closed.get(1), None);

        let restaurant = clean.column("restaurant_key").unwrap().i64().unwrap();
        assert_eq!(restaurant.get(1), Some(1));
        assert_eq!(clean.column("customer_key").unwrap().null_count(), 2);
    }
}
