pub mod channel;
pub mod table;
pub mod utils;

pub use channel::{PgChannel, PgChannelFactory};
pub use table::PgTableManager;
