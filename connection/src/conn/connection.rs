use tracing::{debug, instrument};

use common::err::{RpError, RpResult};

use crate::commands::auth_plugin_switch_command::AuthPluginSwitchCommand;
use crate::commands::authenticate_command::AuthenticateCommand;
use crate::commands::dump_binlog_command::DumpBinlogCommand;
use crate::commands::query_command::QueryCommand;
use crate::commands::register_replica_command::RegisterReplicaCommand;
use crate::conn::binlog_stream::BinlogStream;
use crate::conn::connection_options::ConnectionOptions;
use crate::conn::packet_channel::PacketChannel;
use crate::declar::auth_plugin_names::AuthPlugin;
use crate::declar::response_type::ResponseType;
use crate::packet::auth_switch_packet::AuthSwitchPacket;
use crate::packet::check_error_packet;
use crate::packet::end_of_file_packet::EndOfFilePacket;
use crate::packet::handshake_packet::HandshakePacket;
use crate::packet::result_set_column_packet::ResultSetColumnPacket;
use crate::packet::result_set_row_packet::ResultSetRowPacket;
use crate::bytes::{read_len_enc_num, rsa_encrypt_password};
use crate::UTF8_MB4_GENERAL_CI;

/// 文本协议的查询结果
#[derive(Debug, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// 首行首列，便于取标量
    pub fn single_value(&self) -> Option<String> {
        self.rows.first().and_then(|r| r.first()).and_then(|c| c.clone())
    }
}

/// 源库连接。同步阻塞式，一个连接只在单任务内使用。
#[derive(Debug)]
pub struct Connection {
    pub options: ConnectionOptions,

    channel: Option<PacketChannel>,

    server_version: String,
}

impl Connection {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            channel: None,
            server_version: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// 握手 + 认证
    #[instrument(skip(self), fields(host = %self.options.hostname))]
    pub fn connect(&mut self) -> RpResult<()> {
        if self.channel.is_some() {
            return Ok(());
        }

        let mut channel = PacketChannel::new(&self.options)?;
        let (packet, seq_num) = channel.read_packet()?;
        check_error_packet(&packet, "initial handshake failed.")?;

        let handshake = HandshakePacket::parse(&packet)?;
        self.server_version = handshake.server_version.clone();
        debug!("connected to source {}", self.server_version);

        self.authenticate(&mut channel, &handshake, seq_num + 1)?;
        self.channel = Some(channel);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown();
        }
    }

    fn authenticate(
        &mut self,
        channel: &mut PacketChannel,
        handshake: &HandshakePacket,
        seq_num: u8,
    ) -> RpResult<()> {
        let auth_plugin = AuthPlugin::from_name(&handshake.auth_plugin_name)?;
        let command =
            AuthenticateCommand::new(&self.options, handshake, auth_plugin, UTF8_MB4_GENERAL_CI);
        channel.write_packet(&command.serialize()?, seq_num)?;

        let (packet, seq_num) = channel.read_packet()?;
        check_error_packet(&packet, "authentication failed.")?;

        match packet[0] {
            ResponseType::OK => Ok(()),
            ResponseType::EOF => {
                // AuthSwitchRequest：按指定plugin重发散列
                let switch = AuthSwitchPacket::parse(&packet[1..])?;
                let plugin = AuthPlugin::from_name(&switch.auth_plugin_name)?;
                let command = AuthPluginSwitchCommand::new(
                    self.options.password.clone(),
                    switch.scramble.clone(),
                    plugin,
                );
                channel.write_packet(&command.serialize()?, seq_num + 1)?;

                let (packet, seq_num) = channel.read_packet()?;
                check_error_packet(&packet, "authentication switch failed.")?;
                if packet[0] == ResponseType::AUTH_MORE_DATA {
                    self.sha2_exchange(channel, &switch.scramble, &packet, seq_num)?;
                }
                Ok(())
            }
            ResponseType::AUTH_MORE_DATA => {
                self.sha2_exchange(channel, &handshake.scramble, &packet, seq_num)
            }
            other => Err(RpError::ProtocolErr(format!(
                "unexpected auth response: 0x{:02x}",
                other
            ))),
        }
    }

    /// caching_sha2_password的快速/全量认证收尾
    fn sha2_exchange(
        &mut self,
        channel: &mut PacketChannel,
        scramble: &str,
        packet: &[u8],
        seq_num: u8,
    ) -> RpResult<()> {
        const FAST_AUTH_OK: u8 = 3;
        const FULL_AUTH_REQUIRED: u8 = 4;

        match packet.get(1) {
            Some(&FAST_AUTH_OK) => {
                let (packet, _) = channel.read_packet()?;
                check_error_packet(&packet, "fast authentication failed.")?;
                Ok(())
            }
            Some(&FULL_AUTH_REQUIRED) => {
                // 请求server的RSA公钥
                channel.write_packet(&[0x02], seq_num + 1)?;
                let (key_packet, seq_num) = channel.read_packet()?;
                check_error_packet(&key_packet, "rsa public key request failed.")?;

                let encrypted =
                    rsa_encrypt_password(&self.options.password, scramble, &key_packet[1..])?;
                channel.write_packet(&encrypted, seq_num + 1)?;

                let (packet, _) = channel.read_packet()?;
                check_error_packet(&packet, "full authentication failed.")?;
                Ok(())
            }
            other => Err(RpError::ProtocolErr(format!(
                "unexpected sha2 auth marker: {:?}",
                other
            ))),
        }
    }

    fn channel_mut(&mut self) -> RpResult<&mut PacketChannel> {
        self.channel
            .as_mut()
            .ok_or_else(|| RpError::ConnectionErr("not connected".to_string()))
    }

    /// COM_QUERY，文本协议结果集
    #[instrument(skip(self))]
    pub fn query(&mut self, sql: &str) -> RpResult<QueryResult> {
        let command = QueryCommand::new(sql.to_string());
        let channel = self.channel_mut()?;
        channel.write_packet(&command.serialize()?, 0)?;

        let (packet, _) = channel.read_packet()?;
        check_error_packet(&packet, "query failed.")?;

        if packet[0] == ResponseType::OK {
            // 无结果集（SET等）
            return Ok(QueryResult::default());
        }

        let mut cursor = std::io::Cursor::new(&packet[..]);
        let column_count = read_len_enc_num(&mut cursor)?;

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (packet, _) = channel.read_packet()?;
            check_error_packet(&packet, "column definition failed.")?;
            columns.push(ResultSetColumnPacket::parse(&packet)?.name);
        }

        // 列定义后的EOF
        let (packet, _) = channel.read_packet()?;
        check_error_packet(&packet, "result set failed.")?;
        if !EndOfFilePacket::is_eof(&packet) {
            return Err(RpError::ProtocolErr("expected EOF after columns".to_string()));
        }

        let mut rows = vec![];
        loop {
            let (packet, _) = channel.read_packet()?;
            check_error_packet(&packet, "result row failed.")?;
            if EndOfFilePacket::is_eof(&packet) {
                break;
            }
            rows.push(ResultSetRowPacket::parse(&packet)?.cells);
        }

        Ok(QueryResult { columns, rows })
    }

    /// 执行无结果集的语句
    pub fn exec(&mut self, sql: &str) -> RpResult<()> {
        self.query(sql).map(|_| ())
    }

    /// 注册为replica并开启binlog dump流。
    /// 此后连接只能用于读事件，直到重建。
    #[instrument(skip(self))]
    pub fn binlog_dump(
        &mut self,
        server_id: u32,
        file_name: &str,
        position: u64,
    ) -> RpResult<BinlogStream<'_>> {
        // checksum协商：声明可接收，之后按协商结果剥尾
        self.exec("SET @master_binlog_checksum= @@global.binlog_checksum")?;
        let checksum = self
            .query("SELECT @@global.binlog_checksum")?
            .single_value()
            .unwrap_or_default();
        let checksum_tail = if checksum.eq_ignore_ascii_case("CRC32") {
            4
        } else {
            0
        };

        let register = RegisterReplicaCommand::new(server_id);
        let channel = self.channel_mut()?;
        channel.write_packet(&register.serialize()?, 0)?;
        let (packet, _) = channel.read_packet()?;
        check_error_packet(&packet, "register replica failed.")?;

        let dump = DumpBinlogCommand::new(server_id, file_name.to_string(), position);
        channel.write_packet(&dump.serialize()?, 0)?;

        Ok(BinlogStream::new(channel, checksum_tail))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
