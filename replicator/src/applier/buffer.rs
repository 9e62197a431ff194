use std::collections::BTreeMap;
use std::time::Instant;

use common::config::BatchConfig;
use common::model::coordinate::Coordinate;
use common::schema::column_value::ColumnValue;

/// 缓冲中的单行操作。INSERT与UPDATE都是后像upsert，
/// DELETE落成墓碑行；版本号由事件位点导出，replay稳定。
#[derive(Debug, Clone, PartialEq)]
pub struct RowOp {
    pub delete: bool,
    pub values: Vec<ColumnValue>,
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct TableBatch {
    pub ops: Vec<RowOp>,
}

/// 按表分组的待flush缓冲。三个触发阈值都在这里统计。
#[derive(Debug, Default)]
pub struct BatchBuffer {
    tables: BTreeMap<String, TableBatch>,
    rows: usize,
    bytes: usize,
    first_at: Option<Instant>,
    last_coordinate: Option<Coordinate>,
    last_timestamp: u32,
}

impl BatchBuffer {
    pub fn new() -> Self {
        BatchBuffer::default()
    }

    pub fn push(&mut self, table: &str, op: RowOp, coordinate: Coordinate, timestamp: u32) {
        self.rows += 1;
        self.bytes += op.values.iter().map(|v| v.weight()).sum::<usize>();
        self.first_at.get_or_insert_with(Instant::now);
        self.last_coordinate = Some(coordinate);
        self.last_timestamp = timestamp;
        self.tables
            .entry(table.to_string())
            .or_default()
            .ops
            .push(op);
    }

    /// 行事件之外的推进（被过滤的行、ignore_deletes掉的DELETE）也要
    /// 挪位点，否则checkpoint停在旧事件上
    pub fn mark(&mut self, coordinate: Coordinate, timestamp: u32) {
        self.last_coordinate = Some(coordinate);
        self.last_timestamp = timestamp;
        if self.rows > 0 {
            return;
        }
        // 只有位点要推进时也给时间阈值一个锚点
        self.first_at.get_or_insert_with(Instant::now);
    }

    pub fn should_flush(&self, config: &BatchConfig) -> bool {
        if self.rows >= config.max_records {
            return true;
        }
        if self.bytes >= config.max_bytes {
            return true;
        }
        false
    }

    /// 时间阈值单独判，tail轮询时调用
    pub fn age_exceeded(&self, config: &BatchConfig) -> bool {
        match self.first_at {
            Some(t) => t.elapsed().as_millis() as u64 >= config.max_interval_ms,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.last_coordinate.is_none()
    }

    pub fn has_rows(&self) -> bool {
        self.rows > 0
    }

    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.last_coordinate
    }

    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    /// 取走全部缓冲并复位
    pub fn take(&mut self) -> (BTreeMap<String, TableBatch>, Option<Coordinate>) {
        let tables = std::mem::take(&mut self.tables);
        let last = self.last_coordinate.take();
        self.rows = 0;
        self.bytes = 0;
        self.first_at = None;
        (tables, last)
    }
}

/// flush时把单表操作切成连续同类段，减少目标端round trip
pub fn split_runs(ops: &[RowOp]) -> Vec<&[RowOp]> {
    let mut runs = vec![];
    let mut start = 0usize;
    for i in 1..ops.len() {
        if ops[i].delete != ops[start].delete {
            runs.push(&ops[start..i]);
            start = i;
        }
    }
    if start < ops.len() {
        runs.push(&ops[start..]);
    }
    runs
}

/// 位点 -> 版本号：file_index进高位，offset进低40位。
/// 同一事件replay得到同一版本，merge幂等。
pub fn version_of(coordinate: Coordinate) -> u64 {
    (coordinate.file_index << 40) | (coordinate.offset & 0xFF_FFFF_FFFF)
}

#[cfg(test)]
mod test {
    use super::*;

    fn op(delete: bool, v: i64) -> RowOp {
        RowOp {
            delete,
            values: vec![ColumnValue::SignedInt(v)],
            version: 1,
        }
    }

    #[test]
    fn test_split_runs() {
        let ops = vec![op(false, 1), op(false, 2), op(true, 3), op(false, 4)];
        let runs = split_runs(&ops);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].len(), 2);
        assert!(runs[1][0].delete);
        assert_eq!(runs[2][0].values, vec![ColumnValue::SignedInt(4)]);

        assert!(split_runs(&[]).is_empty());
    }

    #[test]
    fn test_thresholds() {
        let config = BatchConfig {
            max_records: 2,
            max_bytes: 1 << 20,
            max_interval_ms: 60_000,
        };
        let mut b = BatchBuffer::new();
        assert!(!b.should_flush(&config));

        b.push("t", op(false, 1), Coordinate::new(1, 4), 100);
        assert!(!b.should_flush(&config));
        b.push("t", op(false, 2), Coordinate::new(1, 8), 101);
        assert!(b.should_flush(&config));
        assert_eq!(b.last_coordinate(), Some(Coordinate::new(1, 8)));
        assert_eq!(b.last_timestamp(), 101);

        let (tables, last) = b.take();
        assert_eq!(tables["t"].ops.len(), 2);
        assert_eq!(last, Some(Coordinate::new(1, 8)));
        assert!(b.is_empty());
    }

    #[test]
    fn test_version_monotonic() {
        let a = version_of(Coordinate::new(1, 999_999));
        let b = version_of(Coordinate::new(2, 4));
        let c = version_of(Coordinate::new(2, 100));
        assert!(a < b && b < c);
        // 快照行版本0恒小于任何live版本
        assert!(version_of(Coordinate::new(1, 4)) > 0);
    }
}
