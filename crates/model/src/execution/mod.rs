pub mod bad_row;
pub mod outcome;
