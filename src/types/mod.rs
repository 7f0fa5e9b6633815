pub mod activity;
pub mod color;
