//! 권한 스코프 -- 사전 검증된 능력 플래그 집합
//!
//! 스코프는 인증 시스템이 발급한 불투명한 능력 집합으로 소비됩니다.
//! 발급/검증은 이 시스템의 범위 밖입니다.
//!
//! 스코프 검사는 필터 평가보다 먼저 수행되며, 거부는 조용히
//! 이루어집니다 — 권한 없는 호출자에게 필드 존재 여부를 노출하지
//! 않기 위함입니다.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// 구독 능력 플래그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// 원시 보안 이벤트 읽기
    ReadSecurityEvents,
    /// 치명적 알림 읽기
    ReadCriticalAlerts,
    /// 케이스 읽기 (갱신 + 배정)
    ReadCases,
    /// 플레이북 읽기 (실행 + 승인 요청)
    ReadPlaybooks,
    /// 위협 인텔리전스/IOC/공격 패턴 읽기
    ReadThreatIntel,
    /// 상관 결과 읽기
    ReadCorrelations,
    /// 시스템 상태 읽기
    ReadSystemHealth,
}

impl Capability {
    /// 토픽 구독에 필요한 능력을 반환합니다.
    pub fn required_for(topic: Topic) -> Self {
        match topic {
            Topic::RawEvents => Self::ReadSecurityEvents,
            Topic::CriticalAlerts => Self::ReadCriticalAlerts,
            Topic::CaseUpdates | Topic::CaseAssignments => Self::ReadCases,
            Topic::PlaybookExecutions | Topic::PlaybookApprovals => Self::ReadPlaybooks,
            Topic::ThreatIntel | Topic::IocUpdates | Topic::AttackPatterns => {
                Self::ReadThreatIntel
            }
            Topic::Correlations => Self::ReadCorrelations,
            Topic::SystemHealth => Self::ReadSystemHealth,
        }
    }
}

/// 권한 스코프 — 호출자가 보유한 능력 집합
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionScope {
    capabilities: HashSet<Capability>,
}

impl PermissionScope {
    /// 빈 스코프를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 능력들로 스코프를 생성합니다.
    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// 모든 능력을 보유한 스코프를 생성합니다 (내부/테스트용).
    pub fn all() -> Self {
        Self::with_capabilities([
            Capability::ReadSecurityEvents,
            Capability::ReadCriticalAlerts,
            Capability::ReadCases,
            Capability::ReadPlaybooks,
            Capability::ReadThreatIntel,
            Capability::ReadCorrelations,
            Capability::ReadSystemHealth,
        ])
    }

    /// 능력을 추가합니다.
    pub fn grant(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// 토픽 구독이 허용되는지 확인합니다.
    pub fn allows(&self, topic: Topic) -> bool {
        self.capabilities.contains(&Capability::required_for(topic))
    }

    /// 보유한 능력 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// 능력이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
