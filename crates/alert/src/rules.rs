//! 억제 규칙 -- 중복 알림 폭주를 막는 시그니처 기반 윈도우
//!
//! YAML 규칙 파일에서 역직렬화되며, 시그니처 정규식은 로딩 시 한 번만
//! 컴파일됩니다.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_RULES_COUNT: usize = 1000;

/// 억제 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: noisy_av_sensor
/// signature: "^acme:endpoint-av:.*"
/// window_secs: 600
/// status: enabled
/// ```
///
/// 시그니처는 알림 키의 `"vendor:product:name"` 문자열에 대해 매칭됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRule {
    /// 규칙 고유 ID
    pub id: String,
    /// 시그니처 정규식 패턴
    pub signature: String,
    /// 억제 윈도우 (초)
    pub window_secs: u64,
    /// 규칙 상태
    #[serde(default)]
    pub status: SuppressionStatus,
}

impl SuppressionRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.id.is_empty() {
            return Err(AlertError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.signature.is_empty() {
            return Err(AlertError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "signature must not be empty".to_owned(),
            });
        }

        if self.window_secs == 0 {
            return Err(AlertError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "window_secs must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 억제 규칙 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화
    Disabled,
}

/// 컴파일된 억제 규칙
///
/// 시그니처 정규식을 로딩 시 컴파일하여 매칭 시 재컴파일 오버헤드를
/// 제거합니다.
#[derive(Debug)]
pub struct CompiledSuppression {
    /// 원본 규칙
    pub rule: SuppressionRule,
    /// 컴파일된 시그니처 정규식
    pub pattern: Regex,
}

impl CompiledSuppression {
    /// 규칙을 검증하고 시그니처를 컴파일합니다.
    pub fn compile(rule: SuppressionRule) -> Result<Self, AlertError> {
        rule.validate()?;
        let pattern = Regex::new(&rule.signature).map_err(|e| AlertError::RuleValidation {
            rule_id: rule.id.clone(),
            reason: format!("invalid signature regex: {e}"),
        })?;
        Ok(Self { rule, pattern })
    }

    /// 시그니처가 알림 키 문자열에 매칭되는지 확인합니다.
    pub fn matches(&self, signature: &str) -> bool {
        self.rule.status == SuppressionStatus::Enabled && self.pattern.is_match(signature)
    }
}

/// 억제 규칙 파일 로더
pub struct SuppressionLoader;

impl SuppressionLoader {
    /// 디렉토리에서 모든 YAML 억제 규칙 파일을 로드하고 컴파일합니다.
    ///
    /// 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.
    pub async fn load_directory(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<CompiledSuppression>, AlertError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| AlertError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut rules = Vec::new();
        let mut seen_ids = HashSet::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| AlertError::RuleLoad {
            path: dir.display().to_string(),
            reason: format!("failed to read directory entry: {e}"),
        })? {
            let path = entry.path();

            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }

            match Self::load_file(&path).await {
                Ok(compiled) => {
                    if seen_ids.contains(&compiled.rule.id) {
                        tracing::warn!(
                            rule_id = %compiled.rule.id,
                            path = %path.display(),
                            "duplicate suppression rule id, skipping"
                        );
                        continue;
                    }
                    seen_ids.insert(compiled.rule.id.clone());
                    rules.push(compiled);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load suppression rule file, skipping"
                    );
                }
            }

            if rules.len() > MAX_RULES_COUNT {
                return Err(AlertError::RuleLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many suppression rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = rules.len(),
            "loaded suppression rules"
        );

        Ok(rules)
    }

    /// 단일 YAML 파일에서 억제 규칙을 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<CompiledSuppression, AlertError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AlertError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(AlertError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AlertError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        let rule: SuppressionRule =
            serde_yaml::from_str(&content).map_err(|e| AlertError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("YAML parse error: {e}"),
            })?;

        CompiledSuppression::compile(rule)
    }
}
