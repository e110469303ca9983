/// 状态等待
///
/// 固定间隔、固定次数的轮询，直到远端资源满足条件

use common::models::KubeStatusField;
use common::{Error, KubernetesStatus, Result, Volume, VolumeState};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::longhorn::LonghornApi;

/// 轮询策略
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    /// 两次查询之间的间隔
    pub interval: Duration,
    /// 最多查询次数
    pub max_retries: u32,
    pub cancel: CancellationToken,
}

impl WaitPolicy {
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        use common::models::constants::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_INTERVAL_SECS};
        Self::new(
            Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            DEFAULT_RETRY_COUNT,
        )
    }
}

/// 反复调用 `fetch` 直到 `predicate` 成立
///
/// `fetch` 返回 `Ok(None)` 表示资源暂不存在。最多查询 `max_retries` 次，
/// 最后一次查询之后不再等待。用尽次数时，如果最后一次资源仍不存在返回
/// `NotFound`，否则返回带有 `condition` 的 `Timeout`。查询本身出错时立即返回。
pub async fn wait_for<T, F, Fut, P>(
    policy: &WaitPolicy,
    condition: &str,
    mut fetch: F,
    mut predicate: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    P: FnMut(&T) -> bool,
{
    let mut last_seen = false;

    for attempt in 1..=policy.max_retries {
        if policy.cancel.is_cancelled() {
            return Err(Error::Cancelled(condition.to_string()));
        }

        match fetch().await? {
            Some(entity) if predicate(&entity) => {
                debug!("Condition met after {} attempt(s): {}", attempt, condition);
                return Ok(entity);
            }
            Some(_) => last_seen = true,
            None => last_seen = false,
        }

        if attempt < policy.max_retries {
            tokio::select! {
                _ = policy.cancel.cancelled() => {
                    return Err(Error::Cancelled(condition.to_string()));
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    if last_seen {
        Err(Error::Timeout {
            condition: condition.to_string(),
            attempts: policy.max_retries,
        })
    } else {
        Err(Error::NotFound(condition.to_string()))
    }
}

/// 等待卷进入指定状态
pub async fn wait_for_volume_state(
    api: &dyn LonghornApi,
    policy: &WaitPolicy,
    volume: &str,
    state: VolumeState,
) -> Result<Volume> {
    let condition = format!("volume {} state == {}", volume, state);
    wait_for(
        policy,
        &condition,
        || api.get_volume(volume),
        |v: &Volume| v.state == state,
    )
    .await
}

/// 等待卷的 `kubernetesStatus` 满足全部期望
pub async fn wait_for_kubernetes_status(
    api: &dyn LonghornApi,
    policy: &WaitPolicy,
    volume: &str,
    expectations: &[StatusExpectation],
) -> Result<Volume> {
    let condition = format!(
        "volume {} kubernetesStatus {}",
        volume,
        describe(expectations)
    );

    let mut last_status: Option<KubernetesStatus> = None;
    let result = wait_for(
        policy,
        &condition,
        || api.get_volume(volume),
        |v: &Volume| {
            last_status = Some(v.kubernetes_status.clone());
            all_match(expectations, &v.kubernetes_status)
        },
    )
    .await;

    if let (Err(Error::Timeout { .. }), Some(status)) = (&result, &last_status) {
        let unmet: Vec<String> = expectations
            .iter()
            .filter(|e| !e.matches(status))
            .map(|e| format!("{} (actual {:?})", e, status.get(e.field)))
            .collect();
        warn!("Volume {} kubernetesStatus never matched: {}", volume, unmet.join(", "));
    }

    result
}

/// 对 `kubernetesStatus` 某个字段的期望值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusExpectation {
    pub field: KubeStatusField,
    pub value: String,
}

impl StatusExpectation {
    pub fn new(field: KubeStatusField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// 期望字段为空
    pub fn empty(field: KubeStatusField) -> Self {
        Self::new(field, "")
    }

    /// 期望时间戳字段非空，具体值不比较
    pub fn present(field: KubeStatusField) -> Self {
        debug_assert!(field.is_timestamp());
        Self::new(field, "set")
    }

    /// 时间戳字段只要求“同为空”或“同非空”，其余字段要求完全相等
    pub fn matches(&self, status: &KubernetesStatus) -> bool {
        let actual = status.get(self.field);
        if actual == self.value {
            return true;
        }
        self.field.is_timestamp() && actual.is_empty() == self.value.is_empty()
    }
}

impl fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.field.is_timestamp(), self.value.is_empty()) {
            (true, true) => write!(f, "{} empty", self.field),
            (true, false) => write!(f, "{} set", self.field),
            (false, _) => write!(f, "{}={:?}", self.field, self.value),
        }
    }
}

/// 全部期望都成立
pub fn all_match(expectations: &[StatusExpectation], status: &KubernetesStatus) -> bool {
    expectations.iter().all(|e| e.matches(status))
}

fn describe(expectations: &[StatusExpectation]) -> String {
    expectations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
