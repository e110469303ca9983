/// 配置管理
///
/// 运行参数来自环境变量，恢复目标来自 JSON 配置文件

use anyhow::Context;
use common::models::constants::{
    DEFAULT_CONFIG_PATH, DEFAULT_LONGHORN_URL, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_INTERVAL_SECS,
};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// 目标标识的解释方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// 标识即 Longhorn 卷名
    #[default]
    VolumeHandle,
    /// 标识是 PVC 名称，需要根据备份标签反查
    PvcName,
}

impl FromStr for MatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volumehandle" | "volume-handle" | "volume_handle" => Ok(Self::VolumeHandle),
            "pvcname" | "pvc-name" | "pvc_name" | "pvc" => Ok(Self::PvcName),
            other => anyhow::bail!("unknown MATCH_MODE: {}", other),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VolumeHandle => write!(f, "volumeHandle"),
            Self::PvcName => write!(f, "pvcName"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub longhorn_url: String,
    pub config_path: PathBuf,
    pub startup_delay_secs: u64,
    pub tls_insecure: bool,
    pub match_mode: MatchMode,
    pub retry_interval_secs: u64,
    pub retry_count: u32,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let longhorn_url = lookup("LONGHORN_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LONGHORN_URL.to_string());

        let config_path: PathBuf = lookup("CONFIG_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
            .into();

        let startup_delay_secs: u64 = lookup("STARTUP_DELAY_SECS")
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .context("STARTUP_DELAY_SECS must be a number of seconds")?;

        let tls_insecure = match lookup("TLS_INSECURE") {
            Some(v) => parse_bool(&v).context("TLS_INSECURE must be a boolean")?,
            None => false,
        };

        let match_mode = match lookup("MATCH_MODE") {
            Some(v) => v.parse::<MatchMode>()?,
            None => MatchMode::default(),
        };

        let retry_interval_secs: u64 = lookup("RETRY_INTERVAL_SECS")
            .unwrap_or_else(|| DEFAULT_RETRY_INTERVAL_SECS.to_string())
            .parse()
            .context("RETRY_INTERVAL_SECS must be a number of seconds")?;

        let retry_count: u32 = lookup("RETRY_COUNT")
            .unwrap_or_else(|| DEFAULT_RETRY_COUNT.to_string())
            .parse()
            .context("RETRY_COUNT must be a positive integer")?;
        if retry_count == 0 {
            anyhow::bail!("RETRY_COUNT must be at least 1");
        }

        Ok(Self {
            longhorn_url,
            config_path,
            startup_delay_secs,
            tls_insecure,
            match_mode,
            retry_interval_secs,
            retry_count,
        })
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}

/// 单个恢复目标
///
/// 除 `key` 外均来自配置文件中该标识对应的对象。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreTarget {
    #[serde(skip)]
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "createPV", default = "default_true")]
    pub create_pv: bool,
    #[serde(rename = "createPVC", default = "default_true")]
    pub create_pvc: bool,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub pv_name: Option<String>,
    #[serde(default)]
    pub pvc_name: Option<String>,
    #[serde(default)]
    pub pvc_namespace: Option<String>,
}

/// 目标对象中可以识别的键
const TARGET_FIELDS: &[&str] = &[
    "size",
    "createPV",
    "createPVC",
    "groups",
    "pvName",
    "pvcName",
    "pvcNamespace",
];

fn default_true() -> bool {
    true
}

impl RestoreTarget {
    #[cfg(test)]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            create_pv: true,
            create_pvc: true,
            groups: Vec::new(),
            pv_name: None,
            pvc_name: None,
            pvc_namespace: None,
        }
    }
}

/// 读取恢复目标配置文件，目标保持文件中的顺序
pub fn load_targets(path: &Path) -> anyhow::Result<Vec<RestoreTarget>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    parse_targets(&content)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))
}

pub fn parse_targets(content: &str) -> anyhow::Result<Vec<RestoreTarget>> {
    let raw: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(content).context("config must be a JSON object keyed by target")?;

    raw.into_iter()
        .map(|(key, value)| {
            if let Some(fields) = value.as_object() {
                for field in fields.keys().filter(|f| !TARGET_FIELDS.contains(&f.as_str())) {
                    warn!("Ignoring unknown setting {} for target {}", field, key);
                }
            }
            let mut target: RestoreTarget = serde_json::from_value(value)
                .with_context(|| format!("invalid settings for target {}", key))?;
            target.key = key;
            Ok(target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.longhorn_url, DEFAULT_LONGHORN_URL);
        assert_eq!(cfg.config_path, PathBuf::from("/config/config.json"));
        assert_eq!(cfg.startup_delay_secs, 0);
        assert!(!cfg.tls_insecure);
        assert_eq!(cfg.match_mode, MatchMode::VolumeHandle);
        assert_eq!(cfg.retry_interval_secs, 1);
        assert_eq!(cfg.retry_count, 120);
    }

    #[test]
    fn test_config_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("LONGHORN_URL", "https://longhorn.example/v1"),
            ("CONFIG_PATH", "/tmp/restore.json"),
            ("STARTUP_DELAY_SECS", "15"),
            ("TLS_INSECURE", "true"),
            ("MATCH_MODE", "pvcName"),
            ("RETRY_COUNT", "10"),
        ]))
        .unwrap();
        assert_eq!(cfg.longhorn_url, "https://longhorn.example/v1");
        assert_eq!(cfg.config_path, PathBuf::from("/tmp/restore.json"));
        assert_eq!(cfg.startup_delay_secs, 15);
        assert!(cfg.tls_insecure);
        assert_eq!(cfg.match_mode, MatchMode::PvcName);
        assert_eq!(cfg.retry_count, 10);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("STARTUP_DELAY_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("TLS_INSECURE", "maybe")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("MATCH_MODE", "label")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("RETRY_COUNT", "0")])).is_err());
    }

    #[test]
    fn test_parse_targets_defaults_and_order() {
        let targets = parse_targets(
            r#"{
                "pvc-b": {"size": 10737418240, "groups": ["daily", "weekly"]},
                "pvc-a": {"createPV": false, "createPVC": false},
                "pvc-c": {"pvName": "pv-c", "pvcName": "data-c", "pvcNamespace": "apps"}
            }"#,
        )
        .unwrap();

        let keys: Vec<&str> = targets.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["pvc-b", "pvc-a", "pvc-c"]);

        assert_eq!(targets[0].size, Some(10737418240));
        assert!(targets[0].create_pv && targets[0].create_pvc);
        assert_eq!(targets[0].groups, vec!["daily", "weekly"]);

        assert!(!targets[1].create_pv);
        assert!(!targets[1].create_pvc);
        assert_eq!(targets[1].size, None);

        assert_eq!(targets[2].pv_name.as_deref(), Some("pv-c"));
        assert_eq!(targets[2].pvc_name.as_deref(), Some("data-c"));
        assert_eq!(targets[2].pvc_namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_parse_targets_ignores_unknown_fields() {
        let targets = parse_targets(
            r#"{"pvc-a": {"sizee": 1, "storageClass": "longhorn", "groups": ["daily"]}}"#,
        )
        .unwrap();
        let mut expected = RestoreTarget::new("pvc-a");
        expected.groups = vec!["daily".to_string()];
        assert_eq!(targets, vec![expected]);
    }

    #[test]
    fn test_parse_targets_rejects_bad_shapes() {
        assert!(parse_targets(r#"["pvc-a"]"#).is_err());
        assert!(parse_targets(r#"{"pvc-a": {"size": "big"}}"#).is_err());
        assert!(parse_targets(r#"{"pvc-a": 5}"#).is_err());
    }

    #[test]
    fn test_load_targets_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"pvc-a": {{}}}}"#).unwrap();

        let targets = load_targets(file.path()).unwrap();
        assert_eq!(targets, vec![RestoreTarget::new("pvc-a")]);
    }

    #[test]
    fn test_load_targets_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_targets(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
