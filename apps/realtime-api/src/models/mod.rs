pub mod member;
pub mod read_marker;
