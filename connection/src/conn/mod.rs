pub mod binlog_stream;
pub mod connection;
pub mod connection_options;
pub mod packet_channel;
