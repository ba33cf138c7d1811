pub mod cache;
pub mod images;
