pub mod document;
pub mod field;
pub mod term;
