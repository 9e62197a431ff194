pub mod bytes;
pub mod commands;
pub mod conn;
pub mod declar;
pub mod packet;

pub const PACKET_HEADER_SIZE: usize = 4;

pub const NULL_TERMINATOR: u8 = 0;

/// utf8mb4_general_ci
pub const UTF8_MB4_GENERAL_CI: u8 = 45;

/// 单个packet的最大载荷，超过则分包续传
pub const MAX_PACKET_PAYLOAD: usize = 0x00FF_FFFF;
