pub mod color;
pub mod data;
pub mod pickle;
pub mod render;
