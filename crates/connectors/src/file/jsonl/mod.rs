pub mod ledger;
pub mod reader;
pub mod source;

pub use source::JsonlSource;
