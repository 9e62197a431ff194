use common::err::{RpError, RpResult};

use crate::conn::packet_channel::PacketChannel;
use crate::declar::response_type::ResponseType;
use crate::packet::error_packet::ErrorPacket;

/// COM_BINLOG_DUMP之后的事件流。
/// 每个packet：status字节 + 原始事件体（可能带checksum尾）。
pub struct BinlogStream<'a> {
    channel: &'a mut PacketChannel,
    // 事件尾部的checksum字节数（CRC32为4）
    checksum_tail: usize,
}

impl<'a> BinlogStream<'a> {
    pub fn new(channel: &'a mut PacketChannel, checksum_tail: usize) -> Self {
        Self {
            channel,
            checksum_tail,
        }
    }

    /// 读下一个原始事件体（已剥status字节与checksum尾）。
    /// 读超时与EOF都按连接异常上抛，由上层重连。
    pub fn read_event(&mut self) -> RpResult<Vec<u8>> {
        let (mut packet, _) = self.channel.read_packet().map_err(|e| match e {
            RpError::IoError(ioe)
                if ioe.kind() == std::io::ErrorKind::WouldBlock
                    || ioe.kind() == std::io::ErrorKind::TimedOut =>
            {
                RpError::ConnectionErr("binlog stream read timeout".to_string())
            }
            other => other,
        })?;

        if packet.is_empty() {
            return Err(RpError::ConnectionErr("empty binlog packet".to_string()));
        }

        match packet[0] {
            ResponseType::OK => {
                packet.drain(0..1);
                if self.checksum_tail > 0 && packet.len() >= self.checksum_tail {
                    packet.truncate(packet.len() - self.checksum_tail);
                }
                Ok(packet)
            }
            ResponseType::EOF => Err(RpError::ConnectionErr(
                "binlog stream closed by source".to_string(),
            )),
            ResponseType::ERROR => {
                let error = ErrorPacket::parse(&packet[1..])?;
                Err(RpError::ProtocolErr(format!("binlog dump err: {:?}", error)))
            }
            other => Err(RpError::MalformedEvent(format!(
                "unexpected binlog packet status: 0x{:02x}",
                other
            ))),
        }
    }
}
