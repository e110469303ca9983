/// Longhorn Restore - 公共库
///
/// 提供错误类型、Longhorn 数据模型、工具函数等

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use models::{Backup, BackupVolume, KubernetesStatus, Volume, VolumeState};
