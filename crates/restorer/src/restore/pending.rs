/// 待完成的恢复
///
/// 第一轮创建卷后登记，第二轮完成后移除

use common::KubernetesStatus;
use std::collections::HashMap;

/// 一个已发出创建请求、尚未完成后续配置的恢复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRestoration {
    /// 新建卷的名称
    pub volume_name: String,
    /// 来源备份的名称
    pub backup_name: String,
    /// 从备份标签中解出的原始绑定信息
    pub source_status: KubernetesStatus,
}

/// 按目标标识索引的待完成恢复，归属于一次运行
#[derive(Debug, Default)]
pub struct PendingRestorations {
    inner: HashMap<String, PendingRestoration>,
}

impl PendingRestorations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, pending: PendingRestoration) {
        self.inner.insert(key.into(), pending);
    }

    pub fn get(&self, key: &str) -> Option<&PendingRestoration> {
        self.inner.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PendingRestoration> {
        self.inner.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
