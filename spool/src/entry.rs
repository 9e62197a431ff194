use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use getset::Getters;

use common::err::{RpError, RpResult};
use common::model::coordinate::Coordinate;
use common::model::event::ChangeEvent;

use crate::spool_config::ENTRY_HEADER_SIZE;

/// 日志存储块.
/// ========================================
/// 字节大小 = 8 + 8 + 8 + 4 + {payload}.
/// ```txt
/// file_index: 位点文件序号, 8字节
/// offset: 位点偏移, 8字节
/// payload_len: 事件内容大小, 8字节
/// checksum: 事件内容校验值, 4字节
/// payload: bincode编码的事件, 动态大小
/// ```
/// =========================================
#[derive(Debug, Clone, Getters)]
pub struct SpoolEntry {
    #[getset(get = "pub")]
    coordinate: Coordinate,

    // 事件内容大小
    #[getset(get = "pub")]
    payload_len: u64,

    // 事件内容校验值
    #[getset(get = "pub")]
    checksum: u32,

    // 事件实体
    #[getset(get = "pub")]
    event: ChangeEvent,
}

/// 从reader读entry时的结果
pub enum ReadOutcome {
    Entry(SpoolEntry),
    /// 文件尾（干净边界）
    Eof,
    /// 尾部半截entry（写入中或崩溃残留）
    Torn,
}

impl SpoolEntry {
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            coordinate: event.coordinate,
            payload_len: 0,
            checksum: 0,
            event,
        }
    }

    fn checksum_of(buf: &[u8]) -> u32 {
        let mut h = crc32fast::Hasher::new();
        h.update(buf);
        h.finalize()
    }

    /// 序列化entry并写出，返回写出的总字节数
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> RpResult<u64> {
        let payload = bincode::serialize(&self.event)
            .map_err(|e| RpError::SpoolErr(format!("event serialize err: {}", e)))?;

        self.payload_len = payload.len() as u64;
        self.checksum = Self::checksum_of(&payload);

        w.write_u64::<LittleEndian>(self.coordinate.file_index)?;
        w.write_u64::<LittleEndian>(self.coordinate.offset)?;
        w.write_u64::<LittleEndian>(self.payload_len)?;
        w.write_u32::<LittleEndian>(self.checksum)?;
        w.write_all(&payload)?;

        Ok(ENTRY_HEADER_SIZE as u64 + self.payload_len)
    }

    /// 从reader读一个entry。尾部数据不足按Torn返回，由上层截断或等待。
    pub fn read_from<R: Read>(r: &mut R) -> RpResult<ReadOutcome> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        let mut filled = 0usize;
        while filled < ENTRY_HEADER_SIZE {
            let n = r.read(&mut header[filled..])?;
            if n == 0 {
                return if filled == 0 {
                    Ok(ReadOutcome::Eof)
                } else {
                    Ok(ReadOutcome::Torn)
                };
            }
            filled += n;
        }

        let mut c = Cursor::new(&header[..]);
        let file_index = c.read_u64::<LittleEndian>()?;
        let offset = c.read_u64::<LittleEndian>()?;
        let payload_len = c.read_u64::<LittleEndian>()?;
        let checksum = c.read_u32::<LittleEndian>()?;

        let mut payload = vec![0u8; payload_len as usize];
        let mut got = 0usize;
        while got < payload.len() {
            let n = r.read(&mut payload[got..])?;
            if n == 0 {
                return Ok(ReadOutcome::Torn);
            }
            got += n;
        }

        // 校验crc32值
        if checksum != Self::checksum_of(&payload) {
            return Err(RpError::SpoolErr(format!(
                "entry checksum err at {}:{}",
                file_index, offset
            )));
        }

        let event: ChangeEvent = bincode::deserialize(&payload)
            .map_err(|e| RpError::SpoolErr(format!("event deserialize err: {}", e)))?;

        Ok(ReadOutcome::Entry(Self {
            coordinate: Coordinate::new(file_index, offset),
            payload_len,
            checksum,
            event,
        }))
    }

    pub fn into_event(self) -> ChangeEvent {
        self.event
    }
}

/// 全文件扫描结果
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    /// 完整entry数
    pub count: u64,
    pub first: Option<Coordinate>,
    pub last: Option<Coordinate>,
    /// 最后一个完整entry的结束偏移
    pub good_end: u64,
    /// 尾部是否有半截entry
    pub torn: bool,
}

/// 顺序扫描一个spool文件，统计entry数与首尾位点。
/// 尾部半截entry记torn；中段校验失败视作损坏上抛。
pub fn scan_file(path: &std::path::Path) -> RpResult<FileScan> {
    use std::io::BufReader;

    let f = std::fs::File::open(path)?;
    let mut r = BufReader::with_capacity(64 * 1024, f);
    let mut scan = FileScan::default();

    loop {
        match SpoolEntry::read_from(&mut r)? {
            ReadOutcome::Entry(e) => {
                if scan.first.is_none() {
                    scan.first = Some(*e.coordinate());
                }
                scan.last = Some(*e.coordinate());
                scan.count += 1;
                scan.good_end += ENTRY_HEADER_SIZE as u64 + *e.payload_len();
            }
            ReadOutcome::Eof => return Ok(scan),
            ReadOutcome::Torn => {
                scan.torn = true;
                return Ok(scan);
            }
        }
    }
}
