use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::PathBuf;

use tracing::{info, warn};

use common::err::{RpError, RpResult};
use common::model::coordinate::Coordinate;
use common::model::event::ChangeEvent;

use crate::checkpoint::IngestCheckpoint;
use crate::entry::{scan_file, SpoolEntry};
use crate::spool_config::SpoolConfig;
use crate::spool_file::SpoolFile;

const FILE_WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// spool写入端，仅ingestor持有（单写者）。
/// append到活跃文件，达到records_per_file后滚动到下一个file_id；
/// flush成功后才推进ingest checkpoint。
pub struct SpoolWriter {
    config: SpoolConfig,
    checkpoint: IngestCheckpoint,

    writer: BufWriter<File>,
    current_file_id: u64,
    // 活跃文件中的事件数
    records_in_file: u64,
    // 最后一次append的位点
    last_appended: Option<Coordinate>,
    // 最后一次flush落盘的位点
    last_durable: Option<Coordinate>,
}

impl SpoolWriter {
    /// 打开spool目录：续写最后一个未满文件，尾部半截entry直接截掉
    pub fn open(config: SpoolConfig) -> RpResult<Self> {
        let dir = PathBuf::from(config.spool_dir());
        std::fs::create_dir_all(&dir)?;

        let checkpoint = IngestCheckpoint::new(config.spool_dir());
        let ids = SpoolFile::list_file_ids(config.spool_dir())?;

        let (file_id, records_in_file, last_appended) = match ids.last() {
            None => (1u64, 0u64, None),
            Some(&last_id) => {
                let path = SpoolFile::path_of(config.spool_dir(), last_id);
                let scan = scan_file(&path)?;
                if scan.torn {
                    warn!(
                        "spool file {} has torn tail, truncate to {}",
                        path.display(),
                        scan.good_end
                    );
                    let f = OpenOptions::new().write(true).open(&path)?;
                    f.set_len(scan.good_end)?;
                    f.sync_all()?;
                }
                if scan.count >= *config.records_per_file() {
                    (last_id + 1, 0, scan.last)
                } else {
                    (last_id, scan.count, scan.last)
                }
            }
        };

        let path = SpoolFile::path_of(config.spool_dir(), file_id);
        if !path.exists() {
            File::create_new(&path)?;
            info!("spool roll to file {}", path.display());
        }
        let f = OpenOptions::new().append(true).open(&path)?;
        let writer = BufWriter::with_capacity(FILE_WRITE_BUFFER_SIZE, f);

        let last_durable = checkpoint.load()?.map(|s| s.coordinate);
        Ok(Self {
            config,
            checkpoint,
            writer,
            current_file_id: file_id,
            records_in_file,
            last_appended,
            last_durable,
        })
    }

    /// 追加一个事件（非线程安全，只能单线程写）
    pub fn append(&mut self, event: ChangeEvent) -> RpResult<()> {
        if let Some(last) = self.last_appended {
            // 源log先后序必须映射到严格递增的位点
            if event.coordinate <= last {
                return Err(RpError::Bug(format!(
                    "spool append out of order: {} after {}",
                    event.coordinate, last
                )));
            }
        }

        let coordinate = event.coordinate;
        let mut entry = SpoolEntry::new(event);
        entry.write_to(&mut self.writer)?;

        self.records_in_file += 1;
        self.last_appended = Some(coordinate);

        if self.records_in_file >= *self.config.records_per_file() {
            self.roll()?;
        }
        Ok(())
    }

    /// 刷盘并推进ingest checkpoint
    pub fn flush(&mut self) -> RpResult<()> {
        use std::io::Write;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        if let Some(last) = self.last_appended {
            if self.last_durable != Some(last) {
                self.checkpoint.store(last)?;
                self.last_durable = Some(last);
            }
        }
        Ok(())
    }

    /// 滚动到下一个file_id
    fn roll(&mut self) -> RpResult<()> {
        self.flush()?;

        let next_id = self.current_file_id + 1;
        let path = SpoolFile::path_of(self.config.spool_dir(), next_id);
        File::create_new(&path)?;
        info!("spool roll to file {}", path.display());

        let f = OpenOptions::new().append(true).open(&path)?;
        self.writer = BufWriter::with_capacity(FILE_WRITE_BUFFER_SIZE, f);
        self.current_file_id = next_id;
        self.records_in_file = 0;
        Ok(())
    }

    pub fn current_file_id(&self) -> u64 {
        self.current_file_id
    }

    /// 最后一次落盘的位点
    pub fn durable_coordinate(&self) -> Option<Coordinate> {
        self.last_durable
    }

    pub fn last_appended(&self) -> Option<Coordinate> {
        self.last_appended
    }
}

#[cfg(test)]
mod test {
    use common::model::event::{EventKind, RowImage};
    use common::schema::column_value::ColumnValue;

    use super::*;

    fn event(offset: u64) -> ChangeEvent {
        ChangeEvent {
            coordinate: Coordinate::new(1, offset),
            transaction_id: None,
            database: "d".to_string(),
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
        SpoolConfig::new(dir.to_str().unwrap().to_string(), 10, 0)
    }

    #[test]
    fn test_append_roll_checkpoint() {
        let config = scratch("spool_writer_roll_test");
        let dir = config.spool_dir().clone();
        let mut w = SpoolWriter::open(config).unwrap();

        for i in 1..=25u64 {
            w.append(event(i * 4)).unwrap();
        }
        w.flush().unwrap();

        // 10条一个文件，25条落在3个文件里
        assert_eq!(w.current_file_id(), 3);
        assert_eq!(SpoolFile::list_file_ids(&dir).unwrap(), vec![1, 2, 3]);
        assert_eq!(w.durable_coordinate(), Some(Coordinate::new(1, 100)));

        let st = IngestCheckpoint::new(&dir).load().unwrap().unwrap();
        assert_eq!(st.coordinate, Coordinate::new(1, 100));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_out_of_order_rejected() {
        let config = scratch("spool_writer_order_test");
        let dir = config.spool_dir().clone();
        let mut w = SpoolWriter::open(config).unwrap();

        w.append(event(100)).unwrap();
        assert!(w.append(event(50)).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reopen_continues() {
        let config = scratch("spool_writer_reopen_test");
        let dir = config.spool_dir().clone();

        {
            let mut w = SpoolWriter::open(config.clone()).unwrap();
            for i in 1..=7u64 {
                w.append(event(i * 4)).unwrap();
            }
            w.flush().unwrap();
        }

        let mut w = SpoolWriter::open(config).unwrap();
        assert_eq!(w.current_file_id(), 1);
        for i in 8..=12u64 {
            w.append(event(i * 4)).unwrap();
        }
        w.flush().unwrap();
        // 7 + 5 > 10，滚动发生
        assert_eq!(w.current_file_id(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_torn_tail_truncated_on_reopen() {
        let config = scratch("spool_writer_torn_test");
        let dir = config.spool_dir().clone();

        {
            let mut w = SpoolWriter::open(config.clone()).unwrap();
            w.append(event(4)).unwrap();
            w.append(event(8)).unwrap();
            w.flush().unwrap();
        }

        // 人为制造半截entry
        let path = SpoolFile::path_of(&dir, 1);
        let good = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);
        std::fs::write(&path, &bytes).unwrap();

        let mut w = SpoolWriter::open(config).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good);
        w.append(event(12)).unwrap();
        w.flush().unwrap();

        std::fs::remove_dir_all(&dir).ok();
    }
}
