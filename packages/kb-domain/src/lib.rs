pub mod document;
pub mod fields;
pub mod similarity;
pub mod timestamp;
