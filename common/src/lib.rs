pub mod net;
pub mod utils;
