pub mod auth_switch_packet;
pub mod end_of_file_packet;
pub mod error_packet;
pub mod handshake_packet;
pub mod ok_packet;
pub mod result_set_column_packet;
pub mod result_set_row_packet;

use common::err::{RpError, RpResult};

use crate::declar::response_type::ResponseType;
use crate::packet::error_packet::ErrorPacket;

pub fn check_error_packet(packet: &[u8], message: &str) -> RpResult<()> {
    if packet[0] == ResponseType::ERROR {
        let error = ErrorPacket::parse(&packet[1..])?;
        return Err(RpError::ProtocolErr(format!("{} {:?}", message, error)));
    }
    Ok(())
}
