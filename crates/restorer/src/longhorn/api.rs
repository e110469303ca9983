/// Longhorn API 抽象层
///
/// 恢复流程只依赖这个接口，HTTP 实现见 [`super::client::LonghornClient`]

use async_trait::async_trait;
use common::models::CreateVolumeRequest;
use common::{Backup, BackupVolume, Result, Volume};

#[async_trait]
pub trait LonghornApi: Send + Sync + 'static {
    /// 按名称获取卷，不存在时返回 `None`
    async fn get_volume(&self, name: &str) -> Result<Option<Volume>>;

    /// 列出所有卷
    async fn list_volumes(&self) -> Result<Vec<Volume>>;

    /// 按名称获取备份卷，不存在时返回 `None`
    async fn get_backup_volume(&self, name: &str) -> Result<Option<BackupVolume>>;

    /// 列出所有备份卷
    async fn list_backup_volumes(&self) -> Result<Vec<BackupVolume>>;

    /// 获取备份卷下的某个备份
    async fn get_backup(&self, backup_volume: &str, backup_name: &str) -> Result<Backup>;

    /// 从备份创建卷
    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume>;

    /// 将卷加入定时任务组
    async fn add_recurring_job_group(&self, volume: &str, group: &str) -> Result<()>;

    /// 为卷创建 PersistentVolume
    async fn create_pv(&self, volume: &str, pv_name: &str, fs_type: &str) -> Result<()>;

    /// 为卷创建 PersistentVolumeClaim
    async fn create_pvc(&self, volume: &str, namespace: &str, pvc_name: &str) -> Result<()>;
}
