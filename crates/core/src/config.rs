//! 설정 관리 — gridwatch.toml 파싱 및 런타임 설정
//!
//! [`GridwatchConfig`]는 모든 스테이지의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`GRIDWATCH_CORRELATION_MAX_BUFFER_EVENTS=2000` 형식)
//! 3. 설정 파일 (`gridwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), gridwatch_core::error::GridwatchError> {
//! use gridwatch_core::config::GridwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = GridwatchConfig::load("gridwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = GridwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, GridwatchError};

/// Gridwatch 통합 설정
///
/// `gridwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 스테이지는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스트림 수집 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 상관 분석 엔진 설정
    #[serde(default)]
    pub correlation: CorrelationConfig,
    /// 알림 처리 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 배포 레이어 설정
    #[serde(default)]
    pub distribution: DistributionConfig,
    /// 킬 체인 단계 설정
    #[serde(default)]
    pub kill_chain: KillChainConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl GridwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GridwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, GridwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GridwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GridwatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, GridwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            GridwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `GRIDWATCH_{SECTION}_{FIELD}`
    /// 예: `GRIDWATCH_GENERAL_LOG_LEVEL=debug`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "GRIDWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "GRIDWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "GRIDWATCH_GENERAL_PID_FILE");

        // Ingest
        override_usize(
            &mut self.ingest.channel_capacity,
            "GRIDWATCH_INGEST_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.ingest.max_payload_bytes,
            "GRIDWATCH_INGEST_MAX_PAYLOAD_BYTES",
        );

        // Correlation
        override_string(
            &mut self.correlation.rule_dir,
            "GRIDWATCH_CORRELATION_RULE_DIR",
        );
        override_usize(
            &mut self.correlation.max_buffer_events,
            "GRIDWATCH_CORRELATION_MAX_BUFFER_EVENTS",
        );
        override_usize(&mut self.correlation.workers, "GRIDWATCH_CORRELATION_WORKERS");

        // Alert
        override_string(
            &mut self.alert.suppression_dir,
            "GRIDWATCH_ALERT_SUPPRESSION_DIR",
        );
        override_u64(
            &mut self.alert.default_suppression_secs,
            "GRIDWATCH_ALERT_DEFAULT_SUPPRESSION_SECS",
        );
        override_usize(
            &mut self.alert.max_alert_records,
            "GRIDWATCH_ALERT_MAX_ALERT_RECORDS",
        );

        // Distribution
        override_usize(
            &mut self.distribution.mailbox_capacity,
            "GRIDWATCH_DISTRIBUTION_MAILBOX_CAPACITY",
        );

        // Kill chain
        override_csv(&mut self.kill_chain.phases, "GRIDWATCH_KILL_CHAIN_PHASES");

        // Metrics
        override_bool(&mut self.metrics.enabled, "GRIDWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "GRIDWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "GRIDWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), GridwatchError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.ingest.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ingest.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.ingest.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ingest.max_payload_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        const MAX_BUFFER_EVENTS: usize = 1_000_000;
        if self.correlation.max_buffer_events == 0
            || self.correlation.max_buffer_events > MAX_BUFFER_EVENTS
        {
            return Err(ConfigError::InvalidValue {
                field: "correlation.max_buffer_events".to_owned(),
                reason: format!("must be 1-{MAX_BUFFER_EVENTS}"),
            }
            .into());
        }

        if self.correlation.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "correlation.workers".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.alert.default_suppression_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "alert.default_suppression_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.alert.max_alert_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "alert.max_alert_records".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.distribution.mailbox_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "distribution.mailbox_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        // 킬 체인 단계 중복 검증
        let mut seen = std::collections::HashSet::new();
        for phase in &self.kill_chain.phases {
            if !seen.insert(phase) {
                return Err(ConfigError::InvalidValue {
                    field: "kill_chain.phases".to_owned(),
                    reason: format!("duplicate phase '{phase}'"),
                }
                .into());
            }
        }
        if self.kill_chain.phases.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kill_chain.phases".to_owned(),
                reason: "at least one phase is required".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 스트림 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 인바운드 레코드 채널 용량
    pub channel_capacity: usize,
    /// 레코드 페이로드 최대 크기 (바이트)
    pub max_payload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            max_payload_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// 상관 분석 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// 상관 규칙 YAML 디렉토리
    pub rule_dir: String,
    /// 키당 버퍼 최대 이벤트 수
    pub max_buffer_events: usize,
    /// 평가 워커 태스크 수
    pub workers: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            rule_dir: "/etc/gridwatch/rules".to_owned(),
            max_buffer_events: 1000,
            workers: 4,
        }
    }
}

/// 알림 처리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 억제 규칙 YAML 디렉토리
    pub suppression_dir: String,
    /// 매칭 규칙이 없을 때 적용할 기본 억제 윈도우 (초)
    pub default_suppression_secs: u64,
    /// 억제 이력 최대 키 수 (초과 시 가장 오래된 키 축출)
    pub max_alert_records: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            suppression_dir: "/etc/gridwatch/suppression".to_owned(),
            default_suppression_secs: 300,
            max_alert_records: 10_000,
        }
    }
}

/// 배포 레이어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// 구독자별 메일박스 용량 (초과 시 해당 구독자 해제)
    pub mailbox_capacity: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

/// 킬 체인 단계 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KillChainConfig {
    /// 순서 있는 단계 목록
    pub phases: Vec<String>,
}

impl Default for KillChainConfig {
    fn default() -> Self {
        Self {
            phases: [
                "reconnaissance",
                "initial-access",
                "execution",
                "persistence",
                "privilege-escalation",
                "lateral-movement",
                "exfiltration",
                "impact",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 바인드 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9184,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split(',').map(|s| s.trim().to_owned()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = GridwatchConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.correlation.max_buffer_events, 1000);
        assert_eq!(config.alert.default_suppression_secs, 300);
        assert_eq!(config.distribution.mailbox_capacity, 256);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = GridwatchConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = GridwatchConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.correlation.workers, 4);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[correlation]
max_buffer_events = 500
"#;
        let config = GridwatchConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.correlation.max_buffer_events, 500);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
pid_file = "/run/gridwatch.pid"

[ingest]
channel_capacity = 2048
max_payload_bytes = 65536

[correlation]
rule_dir = "/opt/gridwatch/rules"
max_buffer_events = 2000
workers = 8

[alert]
suppression_dir = "/opt/gridwatch/suppression"
default_suppression_secs = 600
max_alert_records = 50000

[distribution]
mailbox_capacity = 512

[kill_chain]
phases = ["initial-access", "execution", "persistence", "exfiltration"]

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9090
"#;
        let config = GridwatchConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.ingest.channel_capacity, 2048);
        assert_eq!(config.correlation.rule_dir, "/opt/gridwatch/rules");
        assert_eq!(config.alert.max_alert_records, 50_000);
        assert_eq!(config.kill_chain.phases.len(), 4);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = GridwatchConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            GridwatchError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = GridwatchConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = GridwatchConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_buffer_bound() {
        let mut config = GridwatchConfig::default();
        config.correlation.max_buffer_events = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = GridwatchConfig::default();
        config.correlation.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_mailbox_capacity() {
        let mut config = GridwatchConfig::default();
        config.distribution.mailbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_phases() {
        let mut config = GridwatchConfig::default();
        config.kill_chain.phases = vec![
            "initial-access".to_owned(),
            "execution".to_owned(),
            "initial-access".to_owned(),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate phase"));
    }

    #[test]
    fn validate_rejects_empty_phase_list() {
        let mut config = GridwatchConfig::default();
        config.kill_chain.phases.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_GRIDWATCH_STR", "overridden") };
        override_string(&mut val, "TEST_GRIDWATCH_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_GRIDWATCH_STR") };
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_GRIDWATCH_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_GRIDWATCH_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_GRIDWATCH_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_csv() {
        let mut val = vec!["a".to_owned()];
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_GRIDWATCH_CSV", "x, y, z") };
        override_csv(&mut val, "TEST_GRIDWATCH_CSV");
        assert_eq!(val, vec!["x", "y", "z"]);
        unsafe { std::env::remove_var("TEST_GRIDWATCH_CSV") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_GRIDWATCH_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = GridwatchConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = GridwatchConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(
            config.correlation.max_buffer_events,
            parsed.correlation.max_buffer_events
        );
        assert_eq!(config.kill_chain.phases, parsed.kill_chain.phases);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = GridwatchConfig::from_file("/nonexistent/path/gridwatch.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            GridwatchError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
