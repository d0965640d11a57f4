pub mod local_storage;

pub use local_storage as local_storage_entity;
