pub mod client;
pub mod target;
pub mod translator;
pub mod value_format;

/// 每张镜像表附带的版本列与墓碑列
pub const VERSION_COLUMN: &str = "_version";
pub const TOMBSTONE_COLUMN: &str = "_is_deleted";
