pub mod db;

pub use db::{
    apply_modified_fields, attach_external_ids, create_db, delete_category,
    delete_rule, delete_transaction, delete_transaction_by_external_id, disconnect_connection,
    enabled_rules,
    find_transaction_by_external_id, find_unlinked_transaction_match, get_category,
    get_connection, get_rule, get_transaction, insert_category,
    insert_connection, insert_rule, insert_transaction, list_categories, list_connections,
    list_rules, list_transactions, mark_connection_syncing, record_sync_failure,
    record_sync_success, seed_default_categories, set_transaction_category,
    uncategorized_transaction_ids, update_rule, DbPool,
};
