pub mod crypto;
pub mod errors;

pub type Result<T, E = errors::WithBacktrace> = core::result::Result<T, E>;
