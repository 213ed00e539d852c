pub mod channel;
pub mod sink;
pub mod source;
pub mod table;
