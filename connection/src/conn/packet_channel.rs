use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use common::err::{RpError, RpResult};

use crate::conn::connection_options::ConnectionOptions;
use crate::{MAX_PACKET_PAYLOAD, PACKET_HEADER_SIZE};

/// MySQL packet帧收发：3字节长度 + 1字节序号 + 载荷
#[derive(Debug)]
pub struct PacketChannel {
    stream: TcpStream,
}

impl PacketChannel {
    pub fn new(options: &ConnectionOptions) -> RpResult<Self> {
        let address = format!("{}:{}", options.hostname, options.port);
        let stream = TcpStream::connect(&address)
            .map_err(|e| RpError::ConnectionErr(format!("connect {} err: {}", address, e)))?;
        stream.set_read_timeout(Some(options.read_timeout))?;
        Ok(Self { stream })
    }

    /// 读一个逻辑packet；0xFFFFFF满包时拼接续包
    pub fn read_packet(&mut self) -> RpResult<(Vec<u8>, u8)> {
        let mut packet: Vec<u8> = vec![];
        let mut seq_num;

        loop {
            let mut header_buffer = [0; PACKET_HEADER_SIZE];
            self.stream.read_exact(&mut header_buffer)?;
            let chunk_size = (&header_buffer[0..3]).read_u24::<LittleEndian>()? as usize;
            seq_num = header_buffer[3];

            let start = packet.len();
            packet.resize(start + chunk_size, 0);
            self.stream.read_exact(&mut packet[start..])?;

            if chunk_size < MAX_PACKET_PAYLOAD {
                break;
            }
        }

        Ok((packet, seq_num))
    }

    pub fn write_packet(&mut self, packet: &[u8], seq_num: u8) -> RpResult<()> {
        if packet.len() >= MAX_PACKET_PAYLOAD {
            return Err(RpError::ProtocolErr("command packet too large".to_string()));
        }
        self.stream.write_u24::<LittleEndian>(packet.len() as u32)?;
        self.stream.write_u8(seq_num)?;
        self.stream.write_all(packet)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
