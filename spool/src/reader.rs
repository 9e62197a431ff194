use std::fs::File;
use std::io::{Seek, SeekFrom};

use tracing::debug;

use common::err::RpResult;
use common::filter::NameFilter;
use common::model::coordinate::Coordinate;
use common::model::event::ChangeEvent;

use crate::entry::{scan_file, ReadOutcome, SpoolEntry};
use crate::floor::FloorRegistry;
use crate::spool_config::SpoolConfig;
use crate::spool_file::SpoolFile;

/// spool读取端（C2）。只读，不推进consumer checkpoint。
/// 到达文件尾后滚动到file_id+1；到达整个spool尾部时
/// try_next返回None，由调用方有界轮询。
pub struct SpoolReader {
    config: SpoolConfig,
    // 持有floor用的reader名（一般为库名）
    name: String,
    floors: FloorRegistry,
    filter: Option<NameFilter>,

    file: Option<File>,
    current_file_id: u64,
    // 当前文件内的读偏移
    position: u64,
    // 跳过 <= 此位点的事件
    after: Coordinate,
    last_delivered: Option<Coordinate>,
}

impl SpoolReader {
    /// 从consumer checkpoint之后开始读
    pub fn open(
        config: SpoolConfig,
        floors: FloorRegistry,
        name: &str,
        after: Coordinate,
        filter: Option<NameFilter>,
    ) -> RpResult<Self> {
        let ids = SpoolFile::list_file_ids(config.spool_dir())?;

        // 起始文件：首位点 <= after 的最后一个文件；无checkpoint时从头读
        let mut start_id = ids.first().copied().unwrap_or(1);
        if !after.is_zero() {
            for &id in &ids {
                let path = SpoolFile::path_of(config.spool_dir(), id);
                match scan_file(&path)?.first {
                    Some(first) if first <= after => start_id = id,
                    _ => break,
                }
            }
        }

        let mut reader = Self {
            config,
            name: name.to_string(),
            floors,
            filter,
            file: None,
            current_file_id: start_id,
            position: 0,
            after,
            last_delivered: None,
        };
        reader.open_current()?;
        Ok(reader)
    }

    fn open_current(&mut self) -> RpResult<()> {
        let path = SpoolFile::path_of(self.config.spool_dir(), self.current_file_id);
        if path.exists() {
            debug!("spool reader {} open file {}", self.name, path.display());
            self.file = Some(File::open(&path)?);
            self.position = 0;
            self.floors.hold(&self.name, self.current_file_id);
        } else {
            self.file = None;
        }
        Ok(())
    }

    /// 读下一个命中filter的事件。尾部无数据返回None。
    pub fn try_next(&mut self) -> RpResult<Option<ChangeEvent>> {
        loop {
            if self.file.is_none() {
                self.open_current()?;
                if self.file.is_none() {
                    return Ok(None);
                }
            }

            let file = match self.file.as_mut() {
                Some(f) => f,
                None => return Ok(None),
            };
            file.seek(SeekFrom::Start(self.position))?;

            match SpoolEntry::read_from(file)? {
                ReadOutcome::Entry(entry) => {
                    self.position = file.stream_position()?;
                    let coordinate = *entry.coordinate();
                    if coordinate <= self.after {
                        continue;
                    }
                    let event = entry.into_event();
                    if !self.matched(&event) {
                        continue;
                    }
                    self.last_delivered = Some(coordinate);
                    return Ok(Some(event));
                }
                ReadOutcome::Eof | ReadOutcome::Torn => {
                    // 半截entry可能是写入中，原地等待；
                    // 写者已滚动到新文件时按文件尾处理
                    let next = SpoolFile::path_of(self.config.spool_dir(), self.current_file_id + 1);
                    if next.exists() {
                        self.current_file_id += 1;
                        self.file = None;
                        continue;
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn matched(&self, event: &ChangeEvent) -> bool {
        match &self.filter {
            None => true,
            Some(f) => {
                if event.table.is_empty() || event.is_ddl() {
                    f.database_matched(&event.database)
                } else {
                    f.table_matched(&event.database, &event.table)
                }
            }
        }
    }

    pub fn current_file_id(&self) -> u64 {
        self.current_file_id
    }

    pub fn last_delivered(&self) -> Option<Coordinate> {
        self.last_delivered
    }
}

impl Drop for SpoolReader {
    fn drop(&mut self) {
        self.floors.release(&self.name);
    }
}

#[cfg(test)]
mod test {
    use common::model::event::{EventKind, RowImage};
    use common::schema::column_value::ColumnValue;

    use crate::writer::SpoolWriter;

    use super::*;

    fn event(db: &str, offset: u64) -> ChangeEvent {
        ChangeEvent {
            coordinate: Coordinate::new(1, offset),
            transaction_id: None,
            database: db.to_string(),
            table: "t".to_string(),
            timestamp: 0,
            kind: EventKind::Insert {
                rows: vec![RowImage(vec![ColumnValue::SignedInt(offset as i64)])],
            },
        }
    }

    fn scratch(name: &str) -> SpoolConfig {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        SpoolConfig::new(dir.to_str().unwrap().to_string(), 5, 0)
    }

    #[test]
    fn test_tail_and_rotate() {
        let config = scratch("spool_reader_rotate_test");
        let dir = config.spool_dir().clone();
        let mut w = SpoolWriter::open(config.clone()).unwrap();
        let floors = FloorRegistry::new();

        let mut r = SpoolReader::open(
            config.clone(),
            floors.clone(),
            "d1",
            Coordinate::default(),
            None,
        )
        .unwrap();
        // 空spool
        assert!(r.try_next().unwrap().is_none());

        for i in 1..=12u64 {
            w.append(event("d1", i * 4)).unwrap();
        }
        w.flush().unwrap();

        let mut got = vec![];
        while let Some(e) = r.try_next().unwrap() {
            got.push(e.coordinate.offset);
        }
        assert_eq!(got, (1..=12).map(|i| i * 4).collect::<Vec<_>>());
        // 跨过了文件1、2，停在3
        assert_eq!(r.current_file_id(), 3);
        assert_eq!(floors.min_floor(), Some(3));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resume_after_checkpoint() {
        let config = scratch("spool_reader_resume_test");
        let dir = config.spool_dir().clone();
        let mut w = SpoolWriter::open(config.clone()).unwrap();
        for i in 1..=12u64 {
            w.append(event("d1", i * 4)).unwrap();
        }
        w.flush().unwrap();

        // 从位点 1:28 (第7条) 之后恢复
        let mut r = SpoolReader::open(
            config,
            FloorRegistry::new(),
            "d1",
            Coordinate::new(1, 28),
            None,
        )
        .unwrap();
        let first = r.try_next().unwrap().unwrap();
        assert_eq!(first.coordinate, Coordinate::new(1, 32));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_database_filter() {
        let config = scratch("spool_reader_filter_test");
        let dir = config.spool_dir().clone();
        let mut w = SpoolWriter::open(config.clone()).unwrap();
        w.append(event("d1", 4)).unwrap();
        w.append(event("d2", 8)).unwrap();
        w.append(event("d1", 12)).unwrap();
        w.flush().unwrap();

        let filter = NameFilter::new(
            common::config::Patterns::One("d1".to_string()),
            Default::default(),
            Default::default(),
            Default::default(),
        );
        let mut r = SpoolReader::open(
            config,
            FloorRegistry::new(),
            "d1",
            Coordinate::default(),
            Some(filter),
        )
        .unwrap();

        let offsets: Vec<u64> = std::iter::from_fn(|| r.try_next().unwrap())
            .map(|e| e.coordinate.offset)
            .collect();
        assert_eq!(offsets, vec![4, 12]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
