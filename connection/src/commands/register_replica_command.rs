use std::io;
use std::io::Cursor;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::commands::CommandType;

/// COM_REGISTER_SLAVE：以replica身份注册后才能dump binlog
pub struct RegisterReplicaCommand {
    pub server_id: u32,
}

impl RegisterReplicaCommand {
    pub fn new(server_id: u32) -> Self {
        Self { server_id }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, io::Error> {
        let mut vec = Vec::new();
        let mut cursor = Cursor::new(&mut vec);

        cursor.write_u8(CommandType::RegisterReplica as u8)?;
        cursor.write_u32::<LittleEndian>(self.server_id)?;
        // hostname / user / password 留空，master不校验
        cursor.write_u8(0)?;
        cursor.write_u8(0)?;
        cursor.write_u8(0)?;
        // port
        cursor.write_u16::<LittleEndian>(0)?;
        // replication rank（忽略）
        cursor.write_u32::<LittleEndian>(0)?;
        // master id（0 = 由master分配）
        cursor.write_u32::<LittleEndian>(0)?;

        Ok(vec)
    }
}
