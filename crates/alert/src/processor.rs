//! 알림 처리기 -- 트리거 판정, 억제, 상위 보고, 권장 조치
//!
//! 치명적 이벤트(severity=Critical 또는 위험 점수 0.9 이상)와 모든 상관
//! 결과가 알림 후보가 됩니다. 후보는 알림 키별 억제 이력을 통과해야
//! 알림으로 발행됩니다.
//!
//! # 억제 의미론
//! 같은 알림 키의 후보가 윈도우 내에 다시 도착하면:
//! - 알림은 발행되지 않습니다
//! - `occurrence_count`는 증가합니다 (폭주 규모 추적용)
//! - `last_alert_time`은 갱신되지 않습니다 (수락된 후보만 갱신)
//!
//! 키별 검사-갱신은 하나의 크리티컬 섹션으로 수행되므로 동시에 도착한
//! 두 후보가 모두 억제를 통과할 수 없습니다.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use gridwatch_core::metrics as m;
use gridwatch_core::types::{
    Alert, AlertSource, CorrelationResult, SecurityEvent, Severity,
};

use crate::actions;
use crate::error::AlertError;
use crate::intel::ThreatIntelIndex;
use crate::rules::CompiledSuppression;

/// 이벤트 트리거 위험 점수 임계값
const RISK_SCORE_THRESHOLD: f64 = 0.9;
/// 상위 보고 점수 임계값
const ESCALATION_SCORE_THRESHOLD: f64 = 0.95;
/// 상위 보고를 강제하는 고위험 기법 식별자
const HIGH_IMPACT_TECHNIQUES: &[&str] = &["T1486", "T1485", "T1490", "T1078"];
/// 시그니처 길이 상한 — 초과 시 억제 경로 평가 실패로 처리
const MAX_SIGNATURE_LEN: usize = 4096;

/// 알림 키 — (벤더, 제품, 이벤트 이름, 출발지 주소) 조합
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    /// 센서 벤더
    pub vendor: String,
    /// 센서 제품
    pub product: String,
    /// 이벤트 이름
    pub name: String,
    /// 출발지 주소 (있을 경우)
    pub address: Option<IpAddr>,
}

impl AlertKey {
    /// 이벤트에서 알림 키를 유도합니다.
    pub fn of(event: &SecurityEvent) -> Self {
        Self {
            vendor: event.origin.vendor.clone(),
            product: event.origin.product.clone(),
            name: event.name.clone(),
            address: event.origin.source_address,
        }
    }

    /// 억제 시그니처 문자열을 반환합니다.
    ///
    /// 억제 규칙의 정규식은 이 문자열에 대해 매칭됩니다.
    pub fn signature(&self) -> String {
        format!("{}:{}:{}", self.vendor, self.product, self.name)
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())?;
        if let Some(addr) = self.address {
            write!(f, "@{addr}")?;
        }
        Ok(())
    }
}

/// 알림 키별 억제 이력
#[derive(Debug, Clone)]
pub struct AlertRecord {
    /// 최초 후보 도착 시각
    pub first_seen: DateTime<Utc>,
    /// 마지막으로 수락된 알림 시각 (단조 증가)
    pub last_alert_time: Option<DateTime<Utc>>,
    /// 후보 도착 횟수 (억제된 후보 포함)
    pub occurrence_count: u64,
}

impl AlertRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_alert_time: None,
            occurrence_count: 0,
        }
    }
}

/// 알림 처리기
///
/// 억제 규칙과 인텔리전스 인덱스는 생성 시 주입됩니다.
/// `&self` API이므로 `Arc`로 감싸 여러 태스크가 공유할 수 있습니다.
pub struct AlertProcessor {
    /// 컴파일된 억제 규칙 (첫 매칭 우선)
    suppressions: Vec<CompiledSuppression>,
    /// 매칭 규칙이 없을 때의 기본 억제 윈도우
    default_window: Duration,
    /// 알림 키별 억제 이력
    records: DashMap<AlertKey, AlertRecord>,
    /// 이력 최대 키 수
    max_records: usize,
    /// 위협 인텔리전스 인덱스
    intel: Arc<ThreatIntelIndex>,
    /// 발행된 알림 수
    generated: AtomicU64,
    /// 억제된 후보 수
    suppressed: AtomicU64,
    /// 상위 보고된 알림 수
    escalated: AtomicU64,
    /// 억제 경로 평가 실패 발생 여부
    degraded: AtomicBool,
}

impl AlertProcessor {
    /// 새 알림 처리기를 생성합니다.
    pub fn new(
        suppressions: Vec<CompiledSuppression>,
        default_suppression_secs: u64,
        max_records: usize,
        intel: Arc<ThreatIntelIndex>,
    ) -> Self {
        Self {
            suppressions,
            default_window: Duration::seconds(
                i64::try_from(default_suppression_secs).unwrap_or(i64::MAX / 2000),
            ),
            records: DashMap::new(),
            max_records: max_records.max(1),
            intel,
            generated: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            escalated: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    /// 이벤트 후보를 처리합니다.
    ///
    /// 트리거 조건(severity=Critical 또는 위험 점수 >= 0.9)을 만족하지
    /// 않으면 None을 반환합니다.
    pub fn process_event(&self, event: &SecurityEvent) -> Option<Alert> {
        self.process_event_at(event, Utc::now())
    }

    /// 주어진 시각 기준으로 이벤트 후보를 처리합니다.
    pub fn process_event_at(&self, event: &SecurityEvent, now: DateTime<Utc>) -> Option<Alert> {
        let triggered = event.severity == Severity::Critical
            || event.risk_score.is_some_and(|s| s >= RISK_SCORE_THRESHOLD);
        if !triggered {
            return None;
        }

        self.evaluate_at(
            AlertSource::Event {
                event: event.clone(),
            },
            now,
        )
    }

    /// 상관 결과 후보를 처리합니다. 모든 상관 결과가 후보입니다.
    pub fn process_correlation(&self, result: CorrelationResult) -> Option<Alert> {
        self.process_correlation_at(result, Utc::now())
    }

    /// 주어진 시각 기준으로 상관 결과 후보를 처리합니다.
    pub fn process_correlation_at(
        &self,
        result: CorrelationResult,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        self.evaluate_at(AlertSource::Correlation { result }, now)
    }

    /// 후보를 억제 이력에 통과시키고 알림을 조립합니다.
    fn evaluate_at(&self, source: AlertSource, now: DateTime<Utc>) -> Option<Alert> {
        let key = AlertKey::of(source.event());
        let signature = key.signature();

        let window = match self.suppression_window(&signature) {
            Ok(window) => window,
            Err(e) => {
                // 보수적 강등: 운영자가 알림을 놓치지 않도록 "억제 안 함"으로 처리
                self.degraded.store(true, Ordering::Relaxed);
                tracing::error!(
                    signature = %signature,
                    error = %e,
                    "suppression lookup failed, treating candidate as not suppressed"
                );
                Duration::zero()
            }
        };

        // 키별 크리티컬 섹션 — 검사와 갱신이 원자적으로 수행됩니다.
        let accepted = {
            let mut record = self
                .records
                .entry(key.clone())
                .or_insert_with(|| AlertRecord::new(now));

            let accepted = match record.last_alert_time {
                Some(last) => now - last >= window,
                None => true,
            };

            record.occurrence_count += 1;
            if accepted {
                record.last_alert_time = Some(now);
            }
            accepted
        };

        if !accepted {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::ALERT_SUPPRESSED_TOTAL).increment(1);
            tracing::debug!(key = %key, "alert candidate suppressed");
            return None;
        }

        self.enforce_record_limit();

        let alert = self.build_alert(source, now);
        self.generated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::ALERT_GENERATED_TOTAL).increment(1);
        if alert.escalation_required {
            self.escalated.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::ALERT_ESCALATED_TOTAL).increment(1);
        }

        tracing::info!(
            alert_id = %alert.id,
            key = %key,
            escalate = alert.escalation_required,
            "alert generated"
        );

        Some(alert)
    }

    /// 시그니처에 매칭되는 첫 활성 규칙의 윈도우를 반환합니다.
    ///
    /// 매칭 규칙이 없으면 기본 윈도우를 사용합니다.
    fn suppression_window(&self, signature: &str) -> Result<Duration, AlertError> {
        if signature.len() > MAX_SIGNATURE_LEN {
            return Err(AlertError::Suppression(format!(
                "signature too long: {} chars (max: {MAX_SIGNATURE_LEN})",
                signature.len()
            )));
        }

        for suppression in &self.suppressions {
            if suppression.matches(signature) {
                return Ok(Duration::seconds(
                    i64::try_from(suppression.rule.window_secs).unwrap_or(i64::MAX / 2000),
                ));
            }
        }
        Ok(self.default_window)
    }

    /// 알림을 조립합니다.
    fn build_alert(&self, source: AlertSource, now: DateTime<Utc>) -> Alert {
        let event = source.event();
        let score = source.score();
        let intel_match = self.intel.matches(event);

        // 트리거 사유 조합
        let mut triggers: Vec<String> = Vec::new();
        if let AlertSource::Correlation { ref result } = source {
            triggers.push(result.summary.clone());
        }
        if event.severity == Severity::Critical {
            triggers.push("critical severity".to_owned());
        }
        if score.is_some_and(|s| s >= RISK_SCORE_THRESHOLD) {
            triggers.push("high risk score".to_owned());
        }
        if !event.techniques.is_empty() {
            triggers.push("matched attack technique".to_owned());
        }
        if intel_match {
            triggers.push("threat-intelligence match".to_owned());
        }

        // 조치 추천 실패는 빈 목록으로 강등 — 알림 발행을 막지 않음
        let recommended = actions::recommend(event);

        let escalation_required = event.severity == Severity::Critical
            && (score.is_some_and(|s| s >= ESCALATION_SCORE_THRESHOLD)
                || intel_match
                || event
                    .techniques
                    .iter()
                    .any(|t| HIGH_IMPACT_TECHNIQUES.contains(&t.as_str())));

        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            severity: Severity::Critical,
            source,
            reasoning: triggers.join("; "),
            actions: recommended,
            escalation_required,
            created_at: now,
        }
    }

    /// 이력 키 수가 상한을 넘으면 가장 오래된 키를 축출합니다.
    ///
    /// 관측된 원본 동작은 무제한 성장이었으므로, 고정 경계 + 오래된 키
    /// 우선 축출로 바운딩합니다.
    fn enforce_record_limit(&self) {
        while self.records.len() > self.max_records {
            let oldest = self
                .records
                .iter()
                .min_by_key(|entry| {
                    entry
                        .value()
                        .last_alert_time
                        .unwrap_or(entry.value().first_seen)
                })
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.records.remove(&key);
                    tracing::debug!(key = %key, "evicted oldest alert record");
                }
                None => break,
            }
        }
    }

    /// 알림 키의 억제 이력을 조회합니다.
    pub fn record(&self, key: &AlertKey) -> Option<AlertRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    /// 이력에 보관 중인 키 수를 반환합니다.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// 발행된 알림 수를 반환합니다.
    pub fn generated_count(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// 억제된 후보 수를 반환합니다.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// 상위 보고된 알림 수를 반환합니다.
    pub fn escalated_count(&self) -> u64 {
        self.escalated.load(Ordering::Relaxed)
    }

    /// 억제 경로 평가 실패가 발생했는지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}
