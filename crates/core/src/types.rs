//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 파이프라인의 모든 스테이지가 공유하는 데이터 구조를 정의합니다.
//! 각 스테이지는 이 타입들을 사용하여 이벤트와 분석 결과를 교환합니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 보안 이벤트의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 이벤트 발생 주체 정보
///
/// 이벤트를 생성한 센서/제품과 관련 주체(주소, 계정, 자원)를 담습니다.
/// 상관 분석 키 유도의 입력이 됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOrigin {
    /// 센서 벤더명
    pub vendor: String,
    /// 센서 제품명
    pub product: String,
    /// 출발지 주소 (있을 경우)
    pub source_address: Option<IpAddr>,
    /// 행위 주체 계정 식별자 (있을 경우)
    pub actor: Option<String>,
    /// 대상 자원 식별자 (있을 경우)
    pub resource: Option<String>,
    /// 개략적 위치 식별자 (지역 코드 등, 있을 경우)
    pub location: Option<String>,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.product)?;
        if let Some(addr) = self.source_address {
            write!(f, " addr={addr}")?;
        }
        if let Some(ref actor) = self.actor {
            write!(f, " actor={actor}")?;
        }
        Ok(())
    }
}

/// 보안 이벤트
///
/// 파이프라인에 유입되는 원자적 보안 관측 단위입니다.
/// 생성 이후 불변이며, 버퍼에서 제거될 뿐 수정되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 이름 (예: "failed-login", "ransomware-detected")
    pub name: String,
    /// 행위 분류 (예: "authentication", "file-access")
    pub category: String,
    /// 심각도
    pub severity: Severity,
    /// 관측 시각
    pub timestamp: DateTime<Utc>,
    /// 발생 주체 정보
    pub origin: EventOrigin,
    /// 추가 필드 (key-value 쌍)
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    /// 공격 기법 태그 (예: "T1486")
    #[serde(default)]
    pub techniques: Vec<String>,
    /// 킬 체인 단계 (알려진 경우)
    #[serde(default)]
    pub kill_chain_phase: Option<String>,
    /// 위험 점수 [0,1] (업스트림 스코어러가 부여한 경우)
    #[serde(default)]
    pub risk_score: Option<f64>,
}

impl SecurityEvent {
    /// 추가 필드에서 값을 조회합니다.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) origin={}",
            self.severity, self.name, self.category, self.origin,
        )
    }
}

/// 상관 분석 규칙 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    /// 시간 근접 기반
    Temporal,
    /// 주소/위치 공유 기반
    Spatial,
    /// 행위자 행동 패턴 기반
    Behavioral,
    /// 킬 체인 단계 진행 기반
    Chain,
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporal => write!(f, "temporal"),
            Self::Spatial => write!(f, "spatial"),
            Self::Behavioral => write!(f, "behavioral"),
            Self::Chain => write!(f, "chain"),
        }
    }
}

/// 상관 분석 결과
///
/// 하나의 규칙이 하나의 트리거 이벤트에 대해 최대 한 번 생성합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// 결과 고유 ID
    pub id: String,
    /// 매칭된 규칙 ID
    pub rule_id: String,
    /// 규칙 종류
    pub kind: CorrelationKind,
    /// 상관 점수 [0,1]
    pub score: f64,
    /// 트리거 이벤트
    pub primary: SecurityEvent,
    /// 연관 이벤트 목록 (트리거 포함, 규칙의 최소 이벤트 수 이상)
    pub related: Vec<SecurityEvent>,
    /// 탐지 시각
    pub detected_at: DateTime<Utc>,
    /// 사람이 읽을 수 있는 요약
    pub summary: String,
}

impl fmt::Display for CorrelationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CorrelationResult[{}] rule={} kind={} score={:.2} events={}",
            &self.id[..8.min(self.id.len())],
            self.rule_id,
            self.kind,
            self.score,
            self.related.len(),
        )
    }
}

/// 권장 대응 조치
///
/// 알림에 첨부되는 대응 권고입니다. 실행은 이 시스템의 범위 밖이며,
/// 다운스트림 대응 도구가 해석합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "target")]
pub enum RecommendedAction {
    /// 호스트 격리
    IsolateHost,
    /// 악성코드 정밀 검사
    RunMalwareScan,
    /// 샘플 수집 및 보존
    CollectSamples,
    /// 주소 차단
    BlockAddress(IpAddr),
    /// 해당 주소의 트래픽 조사
    InspectTraffic(IpAddr),
    /// 계정 활동 검토
    ReviewAccount(String),
    /// 계정 정지 검토
    ConsiderSuspension(String),
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsolateHost => write!(f, "isolate_host"),
            Self::RunMalwareScan => write!(f, "run_malware_scan"),
            Self::CollectSamples => write!(f, "collect_samples"),
            Self::BlockAddress(addr) => write!(f, "block_address:{addr}"),
            Self::InspectTraffic(addr) => write!(f, "inspect_traffic:{addr}"),
            Self::ReviewAccount(actor) => write!(f, "review_account:{actor}"),
            Self::ConsiderSuspension(actor) => write!(f, "consider_suspension:{actor}"),
        }
    }
}

/// 알림의 발원 — 이벤트 직접 트리거 또는 상관 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum AlertSource {
    /// 단일 이벤트가 직접 트리거
    Event {
        /// 트리거 이벤트
        event: SecurityEvent,
    },
    /// 상관 분석 결과가 트리거
    Correlation {
        /// 트리거 상관 결과
        result: CorrelationResult,
    },
}

impl AlertSource {
    /// 발원 이벤트에 대한 참조를 반환합니다.
    ///
    /// 상관 결과인 경우 primary 이벤트를 반환합니다.
    pub fn event(&self) -> &SecurityEvent {
        match self {
            Self::Event { event } => event,
            Self::Correlation { result } => &result.primary,
        }
    }

    /// 상관 점수를 반환합니다. 이벤트 트리거는 risk_score를 사용합니다.
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Event { event } => event.risk_score,
            Self::Correlation { result } => Some(result.score),
        }
    }
}

/// 보안 알림
///
/// 억제 정책을 통과한 후보에서 생성되는 최종 산출물입니다.
/// 배포 레이어로 정확히 한 번 전달됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID
    pub id: String,
    /// 심각도 (항상 Critical)
    pub severity: Severity,
    /// 알림 발원
    pub source: AlertSource,
    /// 트리거 사유 설명
    pub reasoning: String,
    /// 권장 대응 조치
    pub actions: Vec<RecommendedAction>,
    /// 상위 보고 필요 여부
    pub escalation_required: bool,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} escalate={} actions={}",
            self.severity,
            self.source.event().name,
            self.escalation_required,
            self.actions.len(),
        )
    }
}

/// 킬 체인 — 고정 순서의 공격 단계 목록
///
/// 설정에서 주입되며 런타임에 불변입니다.
/// 체인 규칙이 단계 진행을 판정할 때 인덱스 조회에 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillChain {
    phases: Vec<String>,
}

impl KillChain {
    /// 순서 있는 단계 목록으로 킬 체인을 생성합니다.
    pub fn new(phases: Vec<String>) -> Self {
        Self { phases }
    }

    /// 단계명의 인덱스를 반환합니다. 알 수 없는 단계는 None입니다.
    pub fn phase_index(&self, phase: &str) -> Option<usize> {
        self.phases.iter().position(|p| p == phase)
    }

    /// 단계 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// 단계 목록이 비었는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl Default for KillChain {
    fn default() -> Self {
        Self::new(
            [
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
        )
    }
}

// --- 비이벤트 채널 레코드 타입 ---
// ingest 스테이지가 디코딩하고 배포 레이어가 토픽으로 전달합니다.

/// 위협 인텔리전스 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIntelRecord {
    /// 레코드 ID
    pub id: String,
    /// 지표 값 (주소, 기법 ID, 해시 등)
    pub indicator: String,
    /// 지표 종류 (예: "address", "technique", "hash")
    pub indicator_type: String,
    /// 신뢰도 [0,1]
    pub confidence: f64,
    /// 출처 피드명
    pub source: String,
    /// 등록 시각
    pub added_at: DateTime<Utc>,
}

/// IOC 갱신 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocRecord {
    /// 레코드 ID
    pub id: String,
    /// 지표 종류
    pub indicator_type: String,
    /// 지표 값
    pub value: String,
    /// 활성 여부 (false면 폐기된 지표)
    pub active: bool,
}

/// 케이스 갱신 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// 케이스 ID
    pub case_id: String,
    /// 케이스 제목
    pub title: String,
    /// 상태 (예: "open", "investigating", "closed")
    pub status: String,
    /// 담당 분석가 (배정된 경우)
    #[serde(default)]
    pub assignee: Option<String>,
    /// 갱신 시각
    pub updated_at: DateTime<Utc>,
}

/// 플레이북 실행 단계 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybookStepStatus {
    /// 실행 중
    Running,
    /// 승인 대기
    AwaitingApproval,
    /// 완료
    Completed,
    /// 실패
    Failed,
}

/// 플레이북 실행 갱신 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookRecord {
    /// 실행 ID
    pub execution_id: String,
    /// 플레이북 이름
    pub playbook: String,
    /// 현재 단계 이름
    pub step: String,
    /// 단계 상태
    pub step_status: PlaybookStepStatus,
    /// 승인 권한자 목록 (승인 대기 단계에서 사용)
    #[serde(default)]
    pub approvers: Vec<String>,
}

/// 공격 패턴 탐지 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPatternRecord {
    /// 레코드 ID
    pub id: String,
    /// 기법 ID (예: "T1059")
    pub technique_id: String,
    /// 패턴 이름
    pub name: String,
    /// 설명
    #[serde(default)]
    pub description: String,
}
