//! shroud-storage: OpenDAL object store adapter

pub mod operator;
pub mod store;

pub use operator::build_operator;
pub use store::{ObjectReader, ObjectStore};
