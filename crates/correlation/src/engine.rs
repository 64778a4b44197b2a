//! 상관 분석 엔진 -- 키별 버퍼 관리 및 규칙 평가
//!
//! 이벤트 도착 시 해당 키의 버퍼에 추가한 뒤, 그 키 공간에 속한
//! 모든 활성 규칙을 평가합니다. 하나의 키에 대한 버퍼 변경과 규칙
//! 평가는 키별 락으로 직렬화되며, 서로 다른 키는 독립적으로 동시에
//! 평가됩니다.
//!
//! # 키 공간
//! - temporal/chain: origin 키
//! - spatial: address 키
//! - behavioral: actor 키
//!
//! # 에러 정책
//! 규칙 하나의 평가 에러는 해당 규칙만 건너뛰며, 같은 이벤트에 대한
//! 나머지 규칙은 계속 평가됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{Duration, Timelike, Utc};
use dashmap::DashMap;

use gridwatch_core::metrics as m;
use gridwatch_core::types::{CorrelationKind, CorrelationResult, KillChain, SecurityEvent};

use crate::buffer::EventBuffer;
use crate::error::CorrelationError;
use crate::key::CorrelationKey;
use crate::rules::{CorrelationRule, PairMatch};

/// 행동 분석에서 위치 다양성 신호의 상한
const LOCATION_DIVERSITY_CAP: usize = 5;
/// 근무 시간 시작 (UTC 시)
const WORK_HOURS_START: u32 = 8;
/// 근무 시간 종료 (UTC 시)
const WORK_HOURS_END: u32 = 18;

/// 상관 분석 엔진
///
/// 규칙과 킬 체인은 생성 시 주입되며 런타임에 불변입니다.
/// `&self` 기반 API이므로 `Arc`로 감싸 여러 워커가 공유할 수 있습니다.
pub struct CorrelationEngine {
    /// 활성 규칙 목록
    rules: Vec<CorrelationRule>,
    /// 킬 체인 단계 순서
    kill_chain: KillChain,
    /// 키당 버퍼 최대 이벤트 수
    max_buffer_events: usize,
    /// 버퍼 보존 기간 (활성 규칙 윈도우의 최대값)
    max_lookback: Duration,
    /// 키별 버퍼 — 키별 Mutex로 변경+평가를 직렬화합니다
    states: DashMap<CorrelationKey, Arc<Mutex<EventBuffer>>>,
    /// 평가된 이벤트 수
    evaluated: AtomicU64,
    /// 생성된 결과 수
    matched: AtomicU64,
    /// 규칙 평가 에러 수
    eval_errors: AtomicU64,
    /// 버퍼에서 축출된 이벤트 수
    evicted: AtomicU64,
}

impl CorrelationEngine {
    /// 새 엔진을 생성합니다.
    ///
    /// # Errors
    /// 유효하지 않은 규칙이 포함된 경우 실패합니다.
    pub fn new(
        rules: Vec<CorrelationRule>,
        kill_chain: KillChain,
        max_buffer_events: usize,
    ) -> Result<Self, CorrelationError> {
        for rule in &rules {
            rule.validate()?;
        }
        if kill_chain.is_empty() {
            return Err(CorrelationError::Config {
                field: "kill_chain".to_owned(),
                reason: "kill chain must not be empty".to_owned(),
            });
        }

        let max_lookback = rules
            .iter()
            .filter(|r| r.is_enabled())
            .map(|r| r.window_secs)
            .max()
            .unwrap_or(3600);

        Ok(Self {
            rules,
            kill_chain,
            max_buffer_events,
            max_lookback: window_duration(max_lookback),
            states: DashMap::new(),
            evaluated: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            eval_errors: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    /// 이벤트 하나를 처리하고 생성된 상관 결과를 반환합니다.
    ///
    /// 규칙당 최대 하나의 결과가 생성되며, 여러 규칙이 같은 이벤트에
    /// 대해 각각 결과를 낼 수 있습니다.
    pub fn process(&self, event: &SecurityEvent) -> Vec<CorrelationResult> {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::CORRELATION_EVENTS_TOTAL).increment(1);

        let mut results = Vec::new();

        // origin 키 공간: temporal + chain
        let origin_key = CorrelationKey::origin_of(event);
        self.process_keyspace(
            origin_key,
            event,
            &[CorrelationKind::Temporal, CorrelationKind::Chain],
            &mut results,
        );

        // address 키 공간: spatial
        if let Some(address_key) = CorrelationKey::spatial_of(event) {
            self.process_keyspace(address_key, event, &[CorrelationKind::Spatial], &mut results);
        }

        // actor 키 공간: behavioral
        if let Some(actor_key) = CorrelationKey::actor_of(event) {
            self.process_keyspace(actor_key, event, &[CorrelationKind::Behavioral], &mut results);
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::CORRELATION_ACTIVE_KEYS).set(self.states.len() as f64);

        results
    }

    /// 하나의 키 공간에서 버퍼 추가와 규칙 평가를 수행합니다.
    ///
    /// 버퍼 변경과 평가는 키별 Mutex 아래에서 원자적으로 수행됩니다.
    fn process_keyspace(
        &self,
        key: CorrelationKey,
        event: &SecurityEvent,
        kinds: &[CorrelationKind],
        results: &mut Vec<CorrelationResult>,
    ) {
        let buffer_arc = self
            .states
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(EventBuffer::new(self.max_buffer_events)))
            })
            .clone();

        // 키별 크리티컬 섹션 — 같은 키의 동시 유입을 직렬화합니다.
        let mut buffer = buffer_arc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let evicted = buffer.push(event.clone(), self.max_lookback);
        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            metrics::counter!(m::CORRELATION_EVICTED_TOTAL).increment(evicted as u64);
        }

        for rule in self.rules.iter().filter(|r| r.is_enabled()) {
            if !kinds.contains(&rule.kind) {
                continue;
            }

            match self.evaluate_rule(rule, &buffer, event) {
                Ok(Some(result)) => {
                    self.matched.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(
                        m::CORRELATION_RESULTS_TOTAL,
                        m::LABEL_RULE_KIND => result.kind.to_string()
                    )
                    .increment(1);
                    tracing::info!(
                        rule_id = %result.rule_id,
                        kind = %result.kind,
                        score = result.score,
                        related = result.related.len(),
                        "correlation detected"
                    );
                    results.push(result);
                }
                Ok(None) => {}
                Err(e) => {
                    // 규칙 하나의 실패가 나머지 평가를 막지 않습니다.
                    self.eval_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::CORRELATION_EVAL_ERRORS_TOTAL).increment(1);
                    tracing::warn!(
                        rule_id = %rule.id,
                        error = %e,
                        "rule evaluation failed, skipping rule for this event"
                    );
                }
            }
        }
    }

    /// 단일 규칙을 평가합니다.
    fn evaluate_rule(
        &self,
        rule: &CorrelationRule,
        buffer: &EventBuffer,
        trigger: &SecurityEvent,
    ) -> Result<Option<CorrelationResult>, CorrelationError> {
        match rule.kind {
            CorrelationKind::Temporal => Ok(Self::evaluate_temporal(rule, buffer, trigger)),
            CorrelationKind::Spatial => Ok(Self::evaluate_spatial(rule, buffer, trigger)),
            CorrelationKind::Behavioral => Ok(Self::evaluate_behavioral(rule, buffer, trigger)),
            CorrelationKind::Chain => self.evaluate_chain(rule, buffer, trigger),
        }
    }

    /// temporal: 윈도우 내에서 쌍 조건을 만족하는 이벤트 수를 셉니다.
    fn evaluate_temporal(
        rule: &CorrelationRule,
        buffer: &EventBuffer,
        trigger: &SecurityEvent,
    ) -> Option<CorrelationResult> {
        let window = window_duration(rule.window_secs);
        let related: Vec<SecurityEvent> = buffer
            .iter()
            .filter(|e| {
                (trigger.timestamp - e.timestamp).abs() <= window
                    && pair_matches(rule.pair_match, trigger, e)
            })
            .cloned()
            .collect();

        if related.len() < rule.min_events {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let score = (related.len() as f64 / 10.0).min(1.0);
        Some(make_result(rule, trigger, related, score, |n| {
            format!("{n} related events within {}s", rule.window_secs)
        }))
    }

    /// spatial: 같은 네트워크 위치 버퍼에서 쌍 조건을 만족하는 이벤트 수를 셉니다.
    ///
    /// 시간 근접 대신 위치 공유가 기준이며, 규칙 윈도우는 룩백 역할만 합니다.
    fn evaluate_spatial(
        rule: &CorrelationRule,
        buffer: &EventBuffer,
        trigger: &SecurityEvent,
    ) -> Option<CorrelationResult> {
        let lookback = window_duration(rule.window_secs);
        let cutoff = trigger.timestamp - lookback;
        let related: Vec<SecurityEvent> = buffer
            .iter()
            .filter(|e| e.timestamp >= cutoff && pair_matches(rule.pair_match, trigger, e))
            .cloned()
            .collect();

        if related.len() < rule.min_events {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let score = (related.len() as f64 / 5.0).min(1.0);
        Some(make_result(rule, trigger, related, score, |n| {
            format!("{n} events sharing a network location")
        }))
    }

    /// behavioral: 행위자 버퍼에서 세 가지 [0,1] 신호의 평균을 점수로 냅니다.
    ///
    /// - 근무 외 시간 비율 (08:00–18:00 UTC 밖의 이벤트 비율)
    /// - 행위 다양성 (고유 이벤트 이름 수 / 전체)
    /// - 위치 다양성 (고유 위치 수, 5개 상한, / 5)
    fn evaluate_behavioral(
        rule: &CorrelationRule,
        buffer: &EventBuffer,
        trigger: &SecurityEvent,
    ) -> Option<CorrelationResult> {
        let lookback = window_duration(rule.window_secs);
        let cutoff = trigger.timestamp - lookback;
        let related: Vec<SecurityEvent> = buffer
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();

        if related.len() < rule.min_events {
            return None;
        }

        let total = related.len();
        let off_hours = related
            .iter()
            .filter(|e| {
                let hour = e.timestamp.hour();
                !(WORK_HOURS_START..WORK_HOURS_END).contains(&hour)
            })
            .count();

        let unique_names: std::collections::HashSet<&str> =
            related.iter().map(|e| e.name.as_str()).collect();
        let unique_locations: std::collections::HashSet<&str> = related
            .iter()
            .filter_map(|e| e.origin.location.as_deref())
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let score = {
            let off_hours_ratio = off_hours as f64 / total as f64;
            let action_diversity = unique_names.len() as f64 / total as f64;
            let location_diversity =
                unique_locations.len().min(LOCATION_DIVERSITY_CAP) as f64
                    / LOCATION_DIVERSITY_CAP as f64;
            (off_hours_ratio + action_diversity + location_diversity) / 3.0
        };

        Some(make_result(rule, trigger, related, score, |n| {
            format!("behavior profile over {n} actor events")
        }))
    }

    /// chain: 킬 체인 단계 진행 시퀀스를 확장합니다.
    ///
    /// 버퍼를 시간순으로 순회하며, 다음 후보의 단계 인덱스가 현재 링크보다
    /// 크고 차이가 2 이하일 때만 체인을 연장합니다. 연장하지 못하는
    /// 이벤트는 건너뜁니다 (체인을 끊지 않음). 트리거 이벤트가 체인의
    /// 마지막 링크일 때만 결과를 냅니다.
    fn evaluate_chain(
        &self,
        rule: &CorrelationRule,
        buffer: &EventBuffer,
        trigger: &SecurityEvent,
    ) -> Result<Option<CorrelationResult>, CorrelationError> {
        if self.kill_chain.is_empty() {
            return Err(CorrelationError::Evaluation {
                rule_id: rule.id.clone(),
                reason: "empty kill chain".to_owned(),
            });
        }

        let lookback = window_duration(rule.window_secs);
        let cutoff = trigger.timestamp - lookback;

        let mut chain: Vec<SecurityEvent> = Vec::new();
        let mut current_index: Option<usize> = None;

        for event in buffer.iter().filter(|e| e.timestamp >= cutoff) {
            let Some(phase) = event.kill_chain_phase.as_deref() else {
                continue;
            };
            let Some(index) = self.kill_chain.phase_index(phase) else {
                continue;
            };

            match current_index {
                None => {
                    chain.push(event.clone());
                    current_index = Some(index);
                }
                Some(current) if index > current && index - current <= 2 => {
                    chain.push(event.clone());
                    current_index = Some(index);
                }
                Some(_) => {} // 연장 불가 — 건너뜀
            }
        }

        let terminates_at_trigger = chain.last().is_some_and(|e| e.id == trigger.id);
        if !terminates_at_trigger || chain.len() < rule.min_events {
            return Ok(None);
        }

        #[allow(clippy::cast_precision_loss)]
        let score = (chain.len() as f64 / 10.0).min(1.0);
        Ok(Some(make_result(rule, trigger, chain, score, |n| {
            format!("kill-chain progression across {n} phases")
        })))
    }

    /// 평가된 이벤트 수를 반환합니다.
    pub fn evaluated_count(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// 생성된 결과 수를 반환합니다.
    pub fn matched_count(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    /// 규칙 평가 에러 수를 반환합니다.
    pub fn eval_error_count(&self) -> u64 {
        self.eval_errors.load(Ordering::Relaxed)
    }

    /// 버퍼에서 축출된 이벤트 수를 반환합니다.
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// 활성 상관 키 수를 반환합니다.
    pub fn active_keys(&self) -> usize {
        self.states.len()
    }

    /// 로드된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// 규칙 윈도우(초)를 chrono Duration으로 변환합니다.
///
/// chrono Duration의 표현 한계를 넘지 않도록 클램프합니다.
fn window_duration(secs: u64) -> Duration {
    const MAX_WINDOW_SECS: i64 = i64::MAX / 2000;
    Duration::seconds(i64::try_from(secs).unwrap_or(MAX_WINDOW_SECS).min(MAX_WINDOW_SECS))
}

/// 쌍 매칭 조건을 평가합니다.
fn pair_matches(pair_match: PairMatch, trigger: &SecurityEvent, candidate: &SecurityEvent) -> bool {
    match pair_match {
        PairMatch::SameCategory => candidate.category == trigger.category,
        PairMatch::SameName => candidate.name == trigger.name,
        PairMatch::SameActor => {
            candidate.origin.actor.is_some() && candidate.origin.actor == trigger.origin.actor
        }
    }
}

/// 상관 결과를 조립합니다.
fn make_result(
    rule: &CorrelationRule,
    trigger: &SecurityEvent,
    related: Vec<SecurityEvent>,
    score: f64,
    summary: impl FnOnce(usize) -> String,
) -> CorrelationResult {
    let detail = summary(related.len());
    CorrelationResult {
        id: uuid::Uuid::new_v4().to_string(),
        rule_id: rule.id.clone(),
        kind: rule.kind,
        score,
        primary: trigger.clone(),
        related,
        detected_at: Utc::now(),
        summary: format!("{}: {detail}", rule.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleStatus, default_rules};
    use chrono::{TimeZone, Utc};
    use gridwatch_core::types::{EventOrigin, Severity};

    fn event_at(secs: i64) -> SecurityEvent {
        SecurityEvent {
            id: format!("evt-{secs}"),
            name: "login".to_owned(),
            category: "authentication".to_owned(),
            severity: Severity::Medium,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            origin: EventOrigin {
                vendor: "acme".to_owned(),
                product: "gatekeeper".to_owned(),
                source_address: Some("192.168.1.100".parse().unwrap()),
                actor: Some("root".to_owned()),
                resource: None,
                location: None,
            },
            attributes: vec![],
            techniques: vec![],
            kill_chain_phase: None,
            risk_score: None,
        }
    }

    fn temporal_rule(window_secs: u64, min_events: usize) -> CorrelationRule {
        CorrelationRule {
            id: "temporal-test".to_owned(),
            title: "Temporal test".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Temporal,
            status: RuleStatus::Enabled,
            window_secs,
            min_events,
            pair_match: PairMatch::SameCategory,
        }
    }

    fn engine_with(rules: Vec<CorrelationRule>) -> CorrelationEngine {
        CorrelationEngine::new(rules, KillChain::default(), 1000).unwrap()
    }

    #[test]
    fn temporal_fires_at_min_events() {
        let engine = engine_with(vec![temporal_rule(300, 3)]);

        assert!(engine.process(&event_at(0)).is_empty());
        assert!(engine.process(&event_at(60)).is_empty());

        let results = engine.process(&event_at(120));
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.kind, CorrelationKind::Temporal);
        assert_eq!(result.related.len(), 3);
        assert!((result.score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn temporal_ignores_events_outside_window() {
        let engine = engine_with(vec![temporal_rule(60, 3)]);

        engine.process(&event_at(0));
        engine.process(&event_at(30));
        // 이전 두 이벤트는 500초 기준 윈도우(60초) 밖
        let results = engine.process(&event_at(500));
        assert!(results.is_empty());
    }

    #[test]
    fn temporal_respects_pair_predicate() {
        let engine = engine_with(vec![temporal_rule(300, 2)]);

        let mut other = event_at(0);
        other.category = "file-access".to_owned();
        engine.process(&other);

        // 분류가 다르므로 트리거 하나만 매칭 -> min_events 미달
        let results = engine.process(&event_at(10));
        assert!(results.is_empty());
    }

    #[test]
    fn disabled_rule_is_skipped() {
        let mut rule = temporal_rule(300, 1);
        rule.status = RuleStatus::Disabled;
        let engine = engine_with(vec![rule]);
        assert!(engine.process(&event_at(0)).is_empty());
    }

    #[test]
    fn spatial_groups_by_subnet() {
        let rule = CorrelationRule {
            id: "spatial-test".to_owned(),
            title: "Spatial test".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Spatial,
            status: RuleStatus::Enabled,
            window_secs: 3600,
            min_events: 2,
            pair_match: PairMatch::SameCategory,
        };
        let engine = engine_with(vec![rule]);

        let mut a = event_at(0);
        a.origin.source_address = Some("10.1.2.3".parse().unwrap());
        a.origin.vendor = "vendor-a".to_owned();
        engine.process(&a);

        // 다른 벤더, 같은 /24 — spatial 키 공간에서 만남
        let mut b = event_at(100);
        b.id = "evt-b".to_owned();
        b.origin.source_address = Some("10.1.2.77".parse().unwrap());
        b.origin.vendor = "vendor-b".to_owned();
        let results = engine.process(&b);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, CorrelationKind::Spatial);
        assert_eq!(results[0].related.len(), 2);
        assert!((results[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn behavioral_scores_actor_profile() {
        let rule = CorrelationRule {
            id: "behavioral-test".to_owned(),
            title: "Behavioral test".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Behavioral,
            status: RuleStatus::Enabled,
            window_secs: 86_400,
            min_events: 3,
            pair_match: PairMatch::SameActor,
        };
        let engine = engine_with(vec![rule]);

        // 02:00 UTC — 근무 외 시간, 모두 다른 행위와 위치
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let mut results = Vec::new();
        for (i, (name, loc)) in [
            ("login", "kr-seoul"),
            ("file-read", "us-east"),
            ("config-change", "eu-west"),
        ]
        .iter()
        .enumerate()
        {
            let mut event = event_at(i as i64);
            event.id = format!("evt-beh-{i}");
            event.name = (*name).to_owned();
            event.timestamp = base + Duration::seconds(i as i64 * 60);
            event.origin.location = Some((*loc).to_owned());
            results = engine.process(&event);
        }

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.kind, CorrelationKind::Behavioral);
        // off_hours=1.0, action_diversity=1.0, location_diversity=3/5
        let expected = (1.0 + 1.0 + 0.6) / 3.0;
        assert!((result.score - expected).abs() < 1e-9);
    }

    #[test]
    fn chain_requires_phase_progression() {
        let rule = CorrelationRule {
            id: "chain-test".to_owned(),
            title: "Chain test".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Chain,
            status: RuleStatus::Enabled,
            window_secs: 86_400,
            min_events: 3,
            pair_match: PairMatch::SameCategory,
        };
        let kill_chain = KillChain::new(vec![
            "initial-access".to_owned(),
            "execution".to_owned(),
            "persistence".to_owned(),
            "exfiltration".to_owned(),
        ]);
        let engine = CorrelationEngine::new(vec![rule], kill_chain, 1000).unwrap();

        let mut first = event_at(0);
        first.kill_chain_phase = Some("initial-access".to_owned());
        assert!(engine.process(&first).is_empty());

        let mut second = event_at(60);
        second.id = "evt-exec".to_owned();
        second.kill_chain_phase = Some("execution".to_owned());
        assert!(engine.process(&second).is_empty());

        let mut third = event_at(120);
        third.id = "evt-exfil".to_owned();
        third.kill_chain_phase = Some("exfiltration".to_owned());
        let results = engine.process(&third);

        // execution(1) -> exfiltration(3): 거리 2, 연장 가능
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].related.len(), 3);
        assert!((results[0].score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn chain_skips_distant_phase() {
        let rule = CorrelationRule {
            id: "chain-test".to_owned(),
            title: "Chain test".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Chain,
            status: RuleStatus::Enabled,
            window_secs: 86_400,
            min_events: 2,
            pair_match: PairMatch::SameCategory,
        };
        let kill_chain = KillChain::new(vec![
            "initial-access".to_owned(),
            "execution".to_owned(),
            "persistence".to_owned(),
            "exfiltration".to_owned(),
        ]);
        let engine = CorrelationEngine::new(vec![rule], kill_chain, 1000).unwrap();

        let mut first = event_at(0);
        first.kill_chain_phase = Some("initial-access".to_owned());
        engine.process(&first);

        // initial-access(0) -> exfiltration(3): 거리 3, 연장 불가
        let mut jump = event_at(60);
        jump.id = "evt-jump".to_owned();
        jump.kill_chain_phase = Some("exfiltration".to_owned());
        assert!(engine.process(&jump).is_empty());
    }

    #[test]
    fn multiple_rules_emit_independently() {
        let mut rules = vec![temporal_rule(300, 2)];
        rules.push(CorrelationRule {
            id: "temporal-wide".to_owned(),
            title: "Wide temporal".to_owned(),
            description: String::new(),
            kind: CorrelationKind::Temporal,
            status: RuleStatus::Enabled,
            window_secs: 600,
            min_events: 2,
            pair_match: PairMatch::SameName,
        });
        let engine = engine_with(rules);

        engine.process(&event_at(0));
        let results = engine.process(&event_at(10));
        // 두 규칙 모두 독립적으로 결과를 냄
        assert_eq!(results.len(), 2);
        let rule_ids: Vec<_> = results.iter().map(|r| r.rule_id.as_str()).collect();
        assert!(rule_ids.contains(&"temporal-test"));
        assert!(rule_ids.contains(&"temporal-wide"));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let engine = engine_with(vec![temporal_rule(300, 2)]);

        engine.process(&event_at(0));

        // 다른 origin(주소) — 별도 버퍼
        let mut other = event_at(10);
        other.id = "evt-other".to_owned();
        other.origin.source_address = Some("172.16.0.9".parse().unwrap());
        assert!(engine.process(&other).is_empty());

        assert!(engine.active_keys() >= 2);
    }

    #[test]
    fn counters_track_activity() {
        let engine = engine_with(vec![temporal_rule(300, 2)]);
        engine.process(&event_at(0));
        engine.process(&event_at(10));
        assert_eq!(engine.evaluated_count(), 2);
        assert_eq!(engine.matched_count(), 1);
        assert_eq!(engine.eval_error_count(), 0);
    }

    #[test]
    fn default_rule_set_loads() {
        let engine = engine_with(default_rules());
        assert_eq!(engine.rule_count(), 4);
    }

    #[test]
    fn rejects_invalid_rules_at_construction() {
        let mut rule = temporal_rule(300, 2);
        rule.window_secs = 0;
        let result = CorrelationEngine::new(vec![rule], KillChain::default(), 1000);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_processing_across_keys() {
        let engine = Arc::new(engine_with(vec![temporal_rule(300, 2)]));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let mut event = event_at(i);
                    event.id = format!("evt-{worker}-{i}");
                    // 워커마다 다른 주소 -> 다른 키
                    event.origin.source_address =
                        Some(format!("10.{worker}.0.1").parse().unwrap());
                    engine.process(&event);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(engine.evaluated_count(), 400);
        // 각 키에서 두 번째 이벤트부터 매칭
        assert_eq!(engine.matched_count(), 8 * 49);
    }
}
