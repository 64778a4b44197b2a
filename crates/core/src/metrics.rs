//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 스테이지는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `gridwatch_`
//! - 모듈명: `ingest_`, `correlation_`, `alert_`, `distribution_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 입력 채널 레이블 키
pub const LABEL_CHANNEL: &str = "channel";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 상관 규칙 종류 레이블 키 (temporal, spatial, behavioral, chain)
pub const LABEL_RULE_KIND: &str = "kind";

/// 배포 토픽 레이블 키
pub const LABEL_TOPIC: &str = "topic";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 수신된 전체 레코드 수 (counter, label: channel)
pub const INGEST_RECORDS_TOTAL: &str = "gridwatch_ingest_records_total";

/// Ingest: 디코딩 실패 수 (counter, label: channel)
pub const INGEST_DECODE_ERRORS_TOTAL: &str = "gridwatch_ingest_decode_errors_total";

// ─── Correlation 메트릭 ────────────────────────────────────────────

/// Correlation: 평가된 이벤트 수 (counter)
pub const CORRELATION_EVENTS_TOTAL: &str = "gridwatch_correlation_events_total";

/// Correlation: 생성된 상관 결과 수 (counter, label: kind)
pub const CORRELATION_RESULTS_TOTAL: &str = "gridwatch_correlation_results_total";

/// Correlation: 규칙 평가 에러 수 (counter)
pub const CORRELATION_EVAL_ERRORS_TOTAL: &str = "gridwatch_correlation_eval_errors_total";

/// Correlation: 버퍼에서 축출된 이벤트 수 (counter)
pub const CORRELATION_EVICTED_TOTAL: &str = "gridwatch_correlation_evicted_total";

/// Correlation: 활성 상관 키 수 (gauge)
pub const CORRELATION_ACTIVE_KEYS: &str = "gridwatch_correlation_active_keys";

// ─── Alert 메트릭 ──────────────────────────────────────────────────

/// Alert: 생성된 알림 수 (counter)
pub const ALERT_GENERATED_TOTAL: &str = "gridwatch_alert_generated_total";

/// Alert: 억제된 알림 후보 수 (counter)
pub const ALERT_SUPPRESSED_TOTAL: &str = "gridwatch_alert_suppressed_total";

/// Alert: 상위 보고된 알림 수 (counter)
pub const ALERT_ESCALATED_TOTAL: &str = "gridwatch_alert_escalated_total";

// ─── Distribution 메트릭 ───────────────────────────────────────────

/// Distribution: 전달된 아이템 수 (counter, label: topic)
pub const DISTRIBUTION_DELIVERED_TOTAL: &str = "gridwatch_distribution_delivered_total";

/// Distribution: 권한/필터로 걸러진 아이템 수 (counter)
pub const DISTRIBUTION_FILTERED_TOTAL: &str = "gridwatch_distribution_filtered_total";

/// Distribution: 강제 해제된 구독자 수 (counter)
pub const DISTRIBUTION_DISCONNECTED_TOTAL: &str = "gridwatch_distribution_disconnected_total";

/// Distribution: 활성 구독자 수 (gauge)
pub const DISTRIBUTION_ACTIVE_SUBSCRIBERS: &str = "gridwatch_distribution_active_subscribers";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, label: version)
pub const DAEMON_BUILD_INFO: &str = "gridwatch_daemon_build_info";

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "gridwatch_daemon_uptime_seconds";

/// 모든 메트릭의 설명을 recorder에 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(INGEST_RECORDS_TOTAL, "Total records received per channel");
    describe_counter!(INGEST_DECODE_ERRORS_TOTAL, "Total decode failures per channel");

    describe_counter!(CORRELATION_EVENTS_TOTAL, "Total events processed by the engine");
    describe_counter!(CORRELATION_RESULTS_TOTAL, "Total correlation results by kind");
    describe_counter!(CORRELATION_EVAL_ERRORS_TOTAL, "Total rule evaluation errors");
    describe_counter!(CORRELATION_EVICTED_TOTAL, "Total events evicted from buffers");
    describe_gauge!(CORRELATION_ACTIVE_KEYS, "Number of active correlation keys");

    describe_counter!(ALERT_GENERATED_TOTAL, "Total alerts emitted");
    describe_counter!(ALERT_SUPPRESSED_TOTAL, "Total alert candidates suppressed");
    describe_counter!(ALERT_ESCALATED_TOTAL, "Total alerts escalated");

    describe_counter!(DISTRIBUTION_DELIVERED_TOTAL, "Total items delivered per topic");
    describe_counter!(DISTRIBUTION_FILTERED_TOTAL, "Total items rejected by scope or filter");
    describe_counter!(
        DISTRIBUTION_DISCONNECTED_TOTAL,
        "Total subscribers disconnected for slow consumption"
    );
    describe_gauge!(DISTRIBUTION_ACTIVE_SUBSCRIBERS, "Number of live subscribers");

    describe_gauge!(DAEMON_BUILD_INFO, "Build information");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
