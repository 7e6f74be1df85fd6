mod merge_postgres_test;
mod store_postgres_test;
