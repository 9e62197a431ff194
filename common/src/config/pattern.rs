use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

/// 配置中的名称匹配项：单个glob或glob列表。
/// 空值等价于 '*'。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns::Many(vec![])
    }
}

impl Patterns {
    pub fn is_empty(&self) -> bool {
        match self {
            Patterns::One(p) => p.is_empty(),
            Patterns::Many(ps) => ps.is_empty(),
        }
    }

    /// 名称是否命中任一pattern（空pattern视作全匹配）
    pub fn matched(&self, name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.iter().any(|p| WildMatch::new(p).matches(name))
    }

    /// 任一pattern命中则真；与 matched 不同，空集合返回假。
    /// 用于exclude列表。
    pub fn matched_nonempty(&self, name: &str) -> bool {
        !self.is_empty() && self.iter().any(|p| WildMatch::new(p).matches(name))
    }

    /// 是否存在非通配的字面名（用于启动时枚举库）
    pub fn literal_names(&self) -> Vec<String> {
        self.iter()
            .filter(|p| !p.contains('*') && !p.contains('?'))
            .map(|p| p.to_string())
            .collect()
    }

    fn iter(&self) -> impl Iterator<Item = &String> {
        match self {
            Patterns::One(p) => std::slice::from_ref(p).iter(),
            Patterns::Many(ps) => ps.iter(),
        }
    }
}
