pub mod bad_rows;
pub mod jsonl;
