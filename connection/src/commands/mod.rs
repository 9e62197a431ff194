pub mod auth_plugin_switch_command;
pub mod authenticate_command;
pub mod dump_binlog_command;
pub mod query_command;
pub mod register_replica_command;

/// client命令字节
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum CommandType {
    Query = 0x03,
    BinlogDump = 0x12,
    RegisterReplica = 0x15,
}
