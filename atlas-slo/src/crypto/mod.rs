pub mod digest;
pub mod password;
