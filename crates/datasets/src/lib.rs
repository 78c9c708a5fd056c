pub mod schema;
pub mod error;
pub mod cache;
pub mod catalog;
pub mod recipe;

pub use schema::*;
pub use error::*;
pub use cache::*;
pub use catalog::*;
pub use recipe::*;
