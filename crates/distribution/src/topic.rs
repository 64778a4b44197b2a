//! 배포 토픽과 아웃바운드 아이템 봉투
//!
//! 모든 아웃바운드 아이템은 정확히 하나의 토픽에 속합니다.
//! 구독자는 토픽 단위로 구독하며, 권한 스코프와 필터는 토픽의
//! 아이템에 대해 평가됩니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridwatch_core::types::{
    Alert, AttackPatternRecord, CaseRecord, CorrelationResult, IocRecord, PlaybookRecord,
    SecurityEvent, ThreatIntelRecord,
};

/// 구독 토픽
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// 원시 이벤트 스트림
    RawEvents,
    /// 치명적 알림
    CriticalAlerts,
    /// 케이스 갱신
    CaseUpdates,
    /// 케이스 배정
    CaseAssignments,
    /// 플레이북 실행 갱신
    PlaybookExecutions,
    /// 플레이북 승인 요청
    PlaybookApprovals,
    /// 신규 위협 인텔리전스
    ThreatIntel,
    /// IOC 갱신
    IocUpdates,
    /// 공격 패턴 탐지
    AttackPatterns,
    /// 이벤트 상관 결과
    Correlations,
    /// 시스템 상태 갱신
    SystemHealth,
}

impl Topic {
    /// 모든 토픽 목록
    pub const ALL: [Self; 11] = [
        Self::RawEvents,
        Self::CriticalAlerts,
        Self::CaseUpdates,
        Self::CaseAssignments,
        Self::PlaybookExecutions,
        Self::PlaybookApprovals,
        Self::ThreatIntel,
        Self::IocUpdates,
        Self::AttackPatterns,
        Self::Correlations,
        Self::SystemHealth,
    ];

    /// 토픽 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawEvents => "raw-events",
            Self::CriticalAlerts => "critical-alerts",
            Self::CaseUpdates => "case-updates",
            Self::CaseAssignments => "case-assignments",
            Self::PlaybookExecutions => "playbook-executions",
            Self::PlaybookApprovals => "playbook-approvals",
            Self::ThreatIntel => "threat-intel",
            Self::IocUpdates => "ioc-updates",
            Self::AttackPatterns => "attack-patterns",
            Self::Correlations => "correlations",
            Self::SystemHealth => "system-health",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시스템 상태 갱신 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthUpdate {
    /// 전체 상태 ("healthy", "degraded", "unhealthy")
    pub status: String,
    /// 상세 사유 (저하/불능 시)
    #[serde(default)]
    pub detail: String,
    /// 보고 시각
    pub reported_at: DateTime<Utc>,
}

/// 상위 보고 통지 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationNotice {
    /// 대상 알림 ID
    pub alert_id: String,
    /// 보고 사유
    pub reason: String,
    /// 통지 시각
    pub notified_at: DateTime<Utc>,
}

/// 아웃바운드 아이템 — 토픽 봉투
///
/// 각 variant는 정확히 하나의 토픽으로 라우팅됩니다.
#[derive(Debug, Clone)]
pub enum OutboundItem {
    /// 원시 보안 이벤트 (raw-events)
    Event(SecurityEvent),
    /// 알림 (critical-alerts)
    Alert(Alert),
    /// 상위 보고 통지 (critical-alerts)
    Escalation(EscalationNotice),
    /// 상관 결과 (correlations)
    Correlation(CorrelationResult),
    /// 케이스 갱신 (case-updates)
    Case(CaseRecord),
    /// 케이스 배정 (case-assignments)
    Assignment(CaseRecord),
    /// 플레이북 실행 갱신 (playbook-executions)
    PlaybookExecution(PlaybookRecord),
    /// 플레이북 승인 요청 (playbook-approvals)
    ApprovalRequest(PlaybookRecord),
    /// 위협 인텔리전스 (threat-intel)
    ThreatIntel(ThreatIntelRecord),
    /// IOC 갱신 (ioc-updates)
    Ioc(IocRecord),
    /// 공격 패턴 탐지 (attack-patterns)
    AttackPattern(AttackPatternRecord),
    /// 시스템 상태 (system-health)
    Health(HealthUpdate),
}

impl OutboundItem {
    /// 아이템이 속한 토픽을 반환합니다.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Event(_) => Topic::RawEvents,
            Self::Alert(_) | Self::Escalation(_) => Topic::CriticalAlerts,
            Self::Correlation(_) => Topic::Correlations,
            Self::Case(_) => Topic::CaseUpdates,
            Self::Assignment(_) => Topic::CaseAssignments,
            Self::PlaybookExecution(_) => Topic::PlaybookExecutions,
            Self::ApprovalRequest(_) => Topic::PlaybookApprovals,
            Self::ThreatIntel(_) => Topic::ThreatIntel,
            Self::Ioc(_) => Topic::IocUpdates,
            Self::AttackPattern(_) => Topic::AttackPatterns,
            Self::Health(_) => Topic::SystemHealth,
        }
    }
}
