pub mod checkpoint;
pub mod entry;
pub mod floor;
pub mod reader;
pub mod retention;
pub mod spool_config;
pub mod spool_file;
pub mod writer;
