pub mod demo;
pub mod render;
pub mod top;
