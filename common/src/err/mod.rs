pub mod rp_error;

pub use rp_error::RpError;

pub type RpResult<T> = Result<T, RpError>;
