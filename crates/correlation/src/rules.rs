//! 상관 분석 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다.

use serde::{Deserialize, Serialize};

use gridwatch_core::types::CorrelationKind;

use crate::error::CorrelationError;

/// 상관 분석 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: repeated_auth_failure
/// title: Repeated authentication failures from one origin
/// kind: temporal
/// status: enabled
/// window_secs: 300
/// min_events: 3
/// pair_match: same_category
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    /// 규칙 고유 ID (디렉토리 내에서 유일해야 함)
    pub id: String,
    /// 규칙 제목 (결과 요약에 표시)
    pub title: String,
    /// 규칙 설명
    #[serde(default)]
    pub description: String,
    /// 규칙 종류
    pub kind: CorrelationKind,
    /// 규칙 상태
    #[serde(default)]
    pub status: RuleStatus,
    /// 탐색 윈도우 (초)
    pub window_secs: u64,
    /// 최소 연관 이벤트 수
    #[serde(default = "default_min_events")]
    pub min_events: usize,
    /// 쌍 매칭 조건 (temporal/spatial 규칙에서 사용)
    #[serde(default)]
    pub pair_match: PairMatch,
}

fn default_min_events() -> usize {
    2
}

impl CorrelationRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CorrelationError> {
        if self.id.is_empty() {
            return Err(CorrelationError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > 256 {
            return Err(CorrelationError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule id must not exceed 256 characters".to_owned(),
            });
        }

        if self.title.is_empty() {
            return Err(CorrelationError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule title must not be empty".to_owned(),
            });
        }

        if self.window_secs == 0 {
            return Err(CorrelationError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "window_secs must be greater than 0".to_owned(),
            });
        }

        if self.min_events == 0 {
            return Err(CorrelationError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "min_events must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }

    /// 규칙이 활성 상태인지 확인합니다.
    pub fn is_enabled(&self) -> bool {
        self.status == RuleStatus::Enabled
    }
}

/// 규칙 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 활성화 (기본값)
    #[default]
    Enabled,
    /// 비활성화
    Disabled,
}

/// 쌍 매칭 조건 -- temporal/spatial 규칙에서 트리거 이벤트와
/// 버퍼 내 이벤트가 연관되는 기준을 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairMatch {
    /// 같은 행위 분류 (기본값)
    #[default]
    SameCategory,
    /// 같은 이벤트 이름
    SameName,
    /// 같은 행위자
    SameActor,
}

/// 기본 제공 규칙 세트
///
/// 규칙 디렉토리가 비어 있을 때 엔진이 사용하는 네 종류의 기본 규칙입니다.
pub fn default_rules() -> Vec<CorrelationRule> {
    vec![
        CorrelationRule {
            id: "temporal-default".to_owned(),
            title: "Related events in close succession".to_owned(),
            description: "Events of the same category from one origin within the window"
                .to_owned(),
            kind: CorrelationKind::Temporal,
            status: RuleStatus::Enabled,
            window_secs: 300,
            min_events: 2,
            pair_match: PairMatch::SameCategory,
        },
        CorrelationRule {
            id: "spatial-default".to_owned(),
            title: "Related events sharing a network location".to_owned(),
            description: "Events sharing an address, subnet or coarse location".to_owned(),
            kind: CorrelationKind::Spatial,
            status: RuleStatus::Enabled,
            window_secs: 3600,
            min_events: 2,
            pair_match: PairMatch::SameCategory,
        },
        CorrelationRule {
            id: "behavioral-default".to_owned(),
            title: "Anomalous actor behavior profile".to_owned(),
            description: "Off-hours activity, action diversity and location diversity".to_owned(),
            kind: CorrelationKind::Behavioral,
            status: RuleStatus::Enabled,
            window_secs: 86_400,
            min_events: 5,
            pair_match: PairMatch::SameActor,
        },
        CorrelationRule {
            id: "chain-default".to_owned(),
            title: "Kill-chain phase progression".to_owned(),
            description: "Events advancing through adjacent kill-chain phases".to_owned(),
            kind: CorrelationKind::Chain,
            status: RuleStatus::Enabled,
            window_secs: 86_400,
            min_events: 3,
            pair_match: PairMatch::SameCategory,
        },
    ]
}
