// tablestate schema - floor tables and orders for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

diesel::table! {
    tables (id) {
        id -> Integer,
        table_number -> Text,
        capacity -> Integer,
        min_capacity -> Integer,
        status -> Text,              // available | reserved | occupied | maintenance
        has_active_order -> Bool,    // denormalized, see reconcile.rs
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    orders (id) {
        id -> Integer,
        order_number -> Text,
        table_id -> Integer,         // FK to tables.id
        status -> Text,              // pending | preparing | ready | served | completed | cancelled
        subtotal_cents -> BigInt,
        tax_cents -> BigInt,
        discount_cents -> BigInt,
        total_cents -> BigInt,
        order_time -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(orders -> tables (table_id));

diesel::allow_tables_to_appear_in_same_query!(tables, orders);
