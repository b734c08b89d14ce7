diesel::table! {
    product_reservations (id) {
        id -> Int8,
        storage_id -> Int8,
        product_id -> Int8,
        amount -> Int8,
    }
}

diesel::table! {
    products (id) {
        id -> Int8,
        name -> Varchar,
        vendor -> Varchar,
        size -> Varchar,
    }
}

diesel::table! {
    storages (id) {
        id -> Int8,
        is_available -> Bool,
    }
}

diesel::table! {
    stored_products (id) {
        id -> Int8,
        storage_id -> Int8,
        product_id -> Int8,
        amount -> Int8,
    }
}

diesel::joinable!(product_reservations -> products (product_id));
diesel::joinable!(product_reservations -> storages (storage_id));
diesel::joinable!(stored_products -> products (product_id));
diesel::joinable!(stored_products -> storages (storage_id));

diesel::allow_tables_to_appear_in_same_query!(
    product_reservations,
    products,
    storages,
    stored_products,
);
