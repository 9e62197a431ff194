use std::path::{Path, PathBuf};

use getset::Getters;

use common::err::{RpError, RpResult};

use crate::spool_config::{SPOOL_FILE_PRE, VERSION};

/// spool文件信息（文件名、路径、大小）。
/// 文件名: spool-{version}-{file_id}.log
#[derive(Debug, Clone, Getters)]
pub struct SpoolFile {
    // 文件的绝对路径
    #[getset(get = "pub")]
    path: String,
    // 文件名
    #[getset(get = "pub")]
    name: String,
    // 文件大小
    size: u64,
}

impl SpoolFile {
    pub fn new(path: String, name: String, size: u64) -> Self {
        Self { path, name, size }
    }

    pub fn from_path(file_path: &str) -> RpResult<Self> {
        let p = Path::new(file_path);
        let size = p.metadata()?.len();
        let os_name = p
            .file_name()
            .ok_or(RpError::SpoolErr("spool file not exists.".to_string()))?;
        let name = os_name
            .to_str()
            .ok_or(RpError::SpoolErr("spool file not exists.".to_string()))?
            .to_string();
        Ok(Self {
            path: file_path.to_string(),
            name,
            size,
        })
    }

    pub fn file_name_of(file_id: u64) -> String {
        format!("{}-{}-{}.log", SPOOL_FILE_PRE, VERSION, file_id)
    }

    pub fn path_of(spool_dir: &str, file_id: u64) -> PathBuf {
        PathBuf::from(spool_dir).join(Self::file_name_of(file_id))
    }

    /// 判断文件名: spool-{version}-{file_id}.log
    pub fn is_spool_file(file_name: &str) -> bool {
        Self::file_name_split(file_name).is_ok()
    }

    pub fn version(&self) -> RpResult<u32> {
        Ok(Self::file_name_split(self.name())?.0)
    }

    pub fn file_id(&self) -> RpResult<u64> {
        Ok(Self::file_name_split(self.name())?.1)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// spool文件名解析: `[{version},{file_id}]`
    fn file_name_split(file_name: &str) -> RpResult<(u32, u64)> {
        let stem = file_name
            .strip_suffix(".log")
            .ok_or_else(|| RpError::SpoolErr(format!("not a spool file: {}", file_name)))?;
        let mut parts = stem.split('-');
        if parts.next() != Some(SPOOL_FILE_PRE) {
            return Err(RpError::SpoolErr(format!("not a spool file: {}", file_name)));
        }
        let version = parts
            .next()
            .ok_or_else(|| RpError::SpoolErr(format!("not a spool file: {}", file_name)))?
            .parse::<u32>()?;
        let file_id = parts
            .next()
            .ok_or_else(|| RpError::SpoolErr(format!("not a spool file: {}", file_name)))?
            .parse::<u64>()?;
        if parts.next().is_some() || version == 0 || file_id == 0 {
            return Err(RpError::SpoolErr(format!("not a spool file: {}", file_name)));
        }
        Ok((version, file_id))
    }

    /// 枚举目录下所有spool文件id，升序
    pub fn list_file_ids(spool_dir: &str) -> RpResult<Vec<u64>> {
        let mut ids = vec![];
        let dir = PathBuf::from(spool_dir);
        if !dir.exists() {
            return Ok(ids);
        }
        for f in dir.read_dir()? {
            let f = f?;
            if !f.path().is_file() {
                continue;
            }
            if let Some(name) = f.file_name().to_str() {
                if let Ok((_, id)) = Self::file_name_split(name) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
