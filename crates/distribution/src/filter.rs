//! 구독 필터 -- 토픽별 선택 변수의 조합
//!
//! 구독 시점에 호출자가 제공하는 선택적 필터 변수입니다.
//! 설정되지 않은 변수는 제약하지 않으며, 설정된 변수는 모두
//! 만족해야 아이템이 전달됩니다 (AND 결합).
//!
//! 필터는 권한 스코프 검사를 통과한 뒤에만 평가됩니다.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use gridwatch_core::types::{PlaybookStepStatus, SecurityEvent, Severity};

use crate::topic::OutboundItem;

/// 구독 필터
///
/// # 필터 변수와 대상 토픽
/// - `severities` / `min_score` / `vendors` / `addresses` / `techniques`:
///   raw-events, critical-alerts, correlations
/// - `case_id`: case-updates
/// - `assignee`: case-assignments
/// - `approver_identity`: playbook-approvals (승인 대기 단계에서만 전달)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// 허용 심각도 집합
    #[serde(default)]
    pub severities: Option<Vec<Severity>>,
    /// 최소 점수 (위험 점수 또는 상관 점수)
    #[serde(default)]
    pub min_score: Option<f64>,
    /// 허용 벤더 집합
    #[serde(default)]
    pub vendors: Option<Vec<String>>,
    /// 허용 출발지 주소 집합
    #[serde(default)]
    pub addresses: Option<Vec<IpAddr>>,
    /// 허용 기법 ID 집합
    #[serde(default)]
    pub techniques: Option<Vec<String>>,
    /// 케이스 ID 매칭
    #[serde(default)]
    pub case_id: Option<String>,
    /// 담당자 매칭
    #[serde(default)]
    pub assignee: Option<String>,
    /// 승인 권한자 신원
    #[serde(default)]
    pub approver_identity: Option<String>,
}

impl SubscriptionFilter {
    /// 아무것도 제약하지 않는 필터를 생성합니다.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// 아이템이 필터를 통과하는지 평가합니다.
    pub fn matches(&self, item: &OutboundItem) -> bool {
        match item {
            OutboundItem::Event(event) => self.matches_event(event, event.risk_score),
            OutboundItem::Alert(alert) => {
                self.matches_event(alert.source.event(), alert.source.score())
            }
            OutboundItem::Correlation(result) => {
                self.matches_event(&result.primary, Some(result.score))
            }
            OutboundItem::Escalation(_) => true,
            OutboundItem::Case(case) => self
                .case_id
                .as_ref()
                .is_none_or(|wanted| case.case_id == *wanted),
            OutboundItem::Assignment(case) => self
                .assignee
                .as_ref()
                .is_none_or(|wanted| case.assignee.as_deref() == Some(wanted.as_str())),
            OutboundItem::PlaybookExecution(_) => true,
            OutboundItem::ApprovalRequest(playbook) => {
                // 승인 대기 단계 + 승인 권한자 소속이 모두 필요
                playbook.step_status == PlaybookStepStatus::AwaitingApproval
                    && self.approver_identity.as_ref().is_none_or(|identity| {
                        playbook.approvers.iter().any(|a| a == identity)
                    })
            }
            OutboundItem::ThreatIntel(_) | OutboundItem::Ioc(_) => true,
            OutboundItem::AttackPattern(pattern) => self
                .techniques
                .as_ref()
                .is_none_or(|wanted| wanted.iter().any(|t| *t == pattern.technique_id)),
            OutboundItem::Health(_) => true,
        }
    }

    /// 이벤트 계열 아이템에 대한 공통 변수 평가
    fn matches_event(&self, event: &SecurityEvent, score: Option<f64>) -> bool {
        if let Some(ref severities) = self.severities
            && !severities.contains(&event.severity)
        {
            return false;
        }

        if let Some(min_score) = self.min_score
            && !score.is_some_and(|s| s >= min_score)
        {
            return false;
        }

        if let Some(ref vendors) = self.vendors
            && !vendors.contains(&event.origin.vendor)
        {
            return false;
        }

        if let Some(ref addresses) = self.addresses
            && !event
                .origin
                .source_address
                .is_some_and(|addr| addresses.contains(&addr))
        {
            return false;
        }

        if let Some(ref techniques) = self.techniques
            && !event.techniques.iter().any(|t| techniques.contains(t))
        {
            return false;
        }

        true
    }
}
