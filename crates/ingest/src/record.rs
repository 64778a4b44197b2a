//! 인바운드 레코드 타입 — 명명된 채널과 디코딩 결과의 닫힌 합 타입
//!
//! 채널 이름이 레코드 타입 판별자입니다. 문자열 기반 동적 디스패치 대신
//! [`InputChannel`]과 [`ChannelRecord`]를 통해 모든 분기를 컴파일 타임에
//! 완전 매칭합니다.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use gridwatch_core::types::{
    AttackPatternRecord, CaseRecord, IocRecord, PlaybookRecord, SecurityEvent, ThreatIntelRecord,
};

/// 명명된 입력 채널
///
/// 업스트림 로그가 전달하는 여섯 개의 채널을 나타냅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputChannel {
    /// 보안 이벤트 스트림
    SecurityEvents,
    /// 위협 인텔리전스 피드
    ThreatIntelligence,
    /// 공격 패턴 탐지
    AttackPatterns,
    /// IOC 갱신
    IocUpdates,
    /// 케이스 갱신
    CaseUpdates,
    /// 플레이북 실행 갱신
    PlaybookExecutions,
}

impl InputChannel {
    /// 모든 채널 목록
    pub const ALL: [Self; 6] = [
        Self::SecurityEvents,
        Self::ThreatIntelligence,
        Self::AttackPatterns,
        Self::IocUpdates,
        Self::CaseUpdates,
        Self::PlaybookExecutions,
    ];

    /// 채널 이름에서 채널을 해석합니다.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "security-events" => Some(Self::SecurityEvents),
            "threat-intelligence" => Some(Self::ThreatIntelligence),
            "attack-patterns" => Some(Self::AttackPatterns),
            "ioc-updates" => Some(Self::IocUpdates),
            "case-updates" => Some(Self::CaseUpdates),
            "playbook-executions" => Some(Self::PlaybookExecutions),
            _ => None,
        }
    }

    /// 채널 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityEvents => "security-events",
            Self::ThreatIntelligence => "threat-intelligence",
            Self::AttackPatterns => "attack-patterns",
            Self::IocUpdates => "ioc-updates",
            Self::CaseUpdates => "case-updates",
            Self::PlaybookExecutions => "playbook-executions",
        }
    }
}

impl std::fmt::Display for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 수집된 원시 레코드
///
/// 업스트림 로그에서 수신한 디코딩 전 데이터입니다.
/// 전달 보장 책임은 업스트림에 있으며 여기서는 재시도하지 않습니다.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// 수신 채널 이름 (알 수 없는 이름이면 디코딩 단계에서 드롭)
    pub channel: String,
    /// 원시 페이로드 바이트 (JSON)
    pub payload: Bytes,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl RawRecord {
    /// 새 원시 레코드를 생성합니다.
    pub fn new(channel: impl Into<String>, payload: Bytes) -> Self {
        Self {
            channel: channel.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// 디코딩된 채널 레코드 — 닫힌 합 타입
///
/// 각 variant는 정확히 하나의 입력 채널에 대응합니다.
/// 다운스트림 핸들러 디스패치는 이 enum의 완전 매칭으로 수행됩니다.
#[derive(Debug, Clone)]
pub enum ChannelRecord {
    /// security-events 채널
    Event(SecurityEvent),
    /// threat-intelligence 채널
    ThreatIntel(ThreatIntelRecord),
    /// attack-patterns 채널
    AttackPattern(AttackPatternRecord),
    /// ioc-updates 채널
    Ioc(IocRecord),
    /// case-updates 채널
    Case(CaseRecord),
    /// playbook-executions 채널
    Playbook(PlaybookRecord),
}

impl ChannelRecord {
    /// 레코드가 속한 채널을 반환합니다.
    pub fn channel(&self) -> InputChannel {
        match self {
            Self::Event(_) => InputChannel::SecurityEvents,
            Self::ThreatIntel(_) => InputChannel::ThreatIntelligence,
            Self::AttackPattern(_) => InputChannel::AttackPatterns,
            Self::Ioc(_) => InputChannel::IocUpdates,
            Self::Case(_) => InputChannel::CaseUpdates,
            Self::Playbook(_) => InputChannel::PlaybookExecutions,
        }
    }
}
