pub mod adapter;
pub mod models;
pub mod secondary_storage;
