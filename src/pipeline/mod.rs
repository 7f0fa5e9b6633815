pub mod aggregate;
pub mod codec;
pub mod edit;
pub mod elevation;
pub mod geometry;
pub mod locate;
