use std::sync::Arc;

use dashmap::DashMap;

/// reader持有的保留下限。retention不会删除
/// file_id >= 任一floor 的文件。
#[derive(Debug, Clone, Default)]
pub struct FloorRegistry {
    // reader名 -> 正在读的file_id
    floors: Arc<DashMap<String, u64>>,
}

impl FloorRegistry {
    pub fn new() -> Self {
        FloorRegistry::default()
    }

    pub fn hold(&self, reader: &str, file_id: u64) {
        self.floors.insert(reader.to_string(), file_id);
    }

    pub fn release(&self, reader: &str) {
        self.floors.remove(reader);
    }

    /// 当前最小floor，无reader时为None
    pub fn min_floor(&self) -> Option<u64> {
        self.floors.iter().map(|e| *e.value()).min()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_floors() {
        let reg = FloorRegistry::new();
        assert_eq!(reg.min_floor(), None);

        reg.hold("shop", 5);
        reg.hold("billing", 3);
        assert_eq!(reg.min_floor(), Some(3));

        reg.hold("billing", 6);
        assert_eq!(reg.min_floor(), Some(5));

        reg.release("shop");
        assert_eq!(reg.min_floor(), Some(6));
    }
}
