pub mod column_metadata;
pub mod decimal;
pub mod json_binary;
pub mod value_decoder;
