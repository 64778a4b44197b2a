//! 이벤트 시스템 — 스테이지 간 통신의 기본 단위
//!
//! 모든 스테이지 간 통신은 이벤트 기반 메시지 패싱으로 수행됩니다.
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 메타데이터이며,
//! [`Event`] trait은 모든 이벤트 타입이 구현해야 하는 인터페이스입니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Alert, CorrelationResult, SecurityEvent};

// --- 모듈명 상수 ---

/// 스트림 수집 모듈명
pub const MODULE_INGEST: &str = "ingest";
/// 상관 분석 엔진 모듈명
pub const MODULE_CORRELATION: &str = "correlation";
/// 알림 처리 모듈명
pub const MODULE_ALERT: &str = "alert";
/// 배포 레이어 모듈명
pub const MODULE_DISTRIBUTION: &str = "distribution";

// --- 이벤트 타입 상수 ---

/// 스트림 이벤트 타입
pub const EVENT_TYPE_STREAM: &str = "stream";
/// 상관 분석 결과 이벤트 타입
pub const EVENT_TYPE_CORRELATION: &str = "correlation";
/// 알림 이벤트 타입
pub const EVENT_TYPE_ALERT: &str = "alert";
/// 상위 보고 이벤트 타입
pub const EVENT_TYPE_ESCALATION: &str = "escalation";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
///
/// 각 이벤트의 발생 시각, 생성 모듈, 분산 추적 ID를 담고 있어
/// 이벤트 흐름을 추적하고 디버깅할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 이벤트를 생성한 모듈명 (예: "ingest", "correlation")
    pub source_module: String,
    /// 분산 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    ///
    /// 이벤트 체인에서 동일한 추적 ID를 유지할 때 사용합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    ///
    /// 새로운 이벤트 체인의 시작점에서 사용합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            self.timestamp.timestamp(),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// 각 스테이지는 자체 이벤트 타입을 정의하고 이 trait을 구현합니다.
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 수집된 보안 이벤트를 감싸는 스트림 이벤트
///
/// ingest 스테이지가 디코딩한 [`SecurityEvent`]를 상관 분석 엔진과
/// 배포 레이어로 전달할 때 사용합니다.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 디코딩된 보안 이벤트
    pub event: SecurityEvent,
}

impl StreamEvent {
    /// 새로운 trace를 시작하는 스트림 이벤트를 생성합니다.
    pub fn new(event: SecurityEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_INGEST),
            event,
        }
    }

    /// 기존 trace에 연결된 스트림 이벤트를 생성합니다.
    pub fn with_trace(event: SecurityEvent, trace_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_INGEST, trace_id),
            event,
        }
    }
}

impl Event for StreamEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_STREAM
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamEvent[{}] name={} severity={}",
            &self.id[..8.min(self.id.len())],
            self.event.name,
            self.event.severity,
        )
    }
}

/// 상관 분석 결과 이벤트
///
/// 상관 분석 엔진이 규칙 매칭으로 생성한 결과를 전달합니다.
#[derive(Debug, Clone)]
pub struct CorrelationEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 상관 분석 결과
    pub result: CorrelationResult,
}

impl CorrelationEvent {
    /// 새로운 trace를 시작하는 상관 결과 이벤트를 생성합니다.
    pub fn new(result: CorrelationResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_CORRELATION),
            result,
        }
    }

    /// 기존 trace에 연결된 상관 결과 이벤트를 생성합니다.
    pub fn with_trace(result: CorrelationResult, trace_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_CORRELATION, trace_id),
            result,
        }
    }
}

impl Event for CorrelationEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_CORRELATION
    }
}

impl fmt::Display for CorrelationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CorrelationEvent[{}] rule={} kind={} score={:.2}",
            &self.id[..8.min(self.id.len())],
            self.result.rule_id,
            self.result.kind,
            self.result.score,
        )
    }
}

/// 알림 이벤트
///
/// 억제 정책을 통과한 알림을 배포 레이어로 전달합니다.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 알림 상세 정보
    pub alert: Alert,
}

impl AlertEvent {
    /// 새로운 trace를 시작하는 알림 이벤트를 생성합니다.
    pub fn new(alert: Alert) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_ALERT),
            alert,
        }
    }

    /// 기존 trace에 연결된 알림 이벤트를 생성합니다.
    pub fn with_trace(alert: Alert, trace_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_ALERT, trace_id),
            alert,
        }
    }
}

impl Event for AlertEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ALERT
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlertEvent[{}] source={} escalate={}",
            &self.id[..8.min(self.id.len())],
            self.alert.source.event().name,
            self.alert.escalation_required,
        )
    }
}

/// 상위 보고 이벤트
///
/// 즉시 대응이 필요한 알림에 대해 별도로 발행되는 통지입니다.
#[derive(Debug, Clone)]
pub struct EscalationEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 상위 보고 대상 알림 ID
    pub alert_id: String,
    /// 보고 사유
    pub reason: String,
}

impl EscalationEvent {
    /// 알림에 대한 상위 보고 이벤트를 생성합니다.
    pub fn new(alert_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_ALERT),
            alert_id: alert_id.into(),
            reason: reason.into(),
        }
    }
}

impl Event for EscalationEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ESCALATION
    }
}

impl fmt::Display for EscalationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EscalationEvent[{}] alert={} reason={}",
            &self.id[..8.min(self.id.len())],
            self.alert_id,
            self.reason,
        )
    }
}
