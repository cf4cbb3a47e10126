pub mod debug;
pub mod pdf;
