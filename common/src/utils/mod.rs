pub mod file;
pub mod net;
