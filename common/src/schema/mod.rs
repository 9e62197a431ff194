pub mod column_type;
pub mod column_value;
pub mod descriptor;
