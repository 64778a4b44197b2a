//! 위협 인텔리전스 인덱스 -- 인메모리 지표 조회
//!
//! ingest 스테이지가 threat-intelligence 채널에서 디코딩한 지표를
//! 누적하고, 알림 처리 시 이벤트의 주소/기법이 알려진 지표와
//! 일치하는지 조회합니다.

use std::collections::HashSet;
use std::sync::RwLock;

use gridwatch_core::types::{SecurityEvent, ThreatIntelRecord};

/// 인덱스 크기 상한 — 초과 유입은 드롭하고 경고를 남깁니다.
const MAX_INDICATORS: usize = 1_000_000;

/// 위협 인텔리전스 지표 인덱스
///
/// 쓰기(피드 유입)는 드물고 읽기(알림 판정)는 빈번하므로 RwLock을
/// 사용합니다.
#[derive(Debug, Default)]
pub struct ThreatIntelIndex {
    /// 주소 지표 (문자열 표현)
    addresses: RwLock<HashSet<String>>,
    /// 기법 지표 (예: "T1486")
    techniques: RwLock<HashSet<String>>,
}

impl ThreatIntelIndex {
    /// 빈 인덱스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 인텔리전스 레코드를 인덱스에 반영합니다.
    pub fn insert(&self, record: &ThreatIntelRecord) {
        let target = match record.indicator_type.as_str() {
            "address" | "ip" => &self.addresses,
            "technique" => &self.techniques,
            other => {
                tracing::debug!(
                    indicator_type = other,
                    "unsupported indicator type, ignoring"
                );
                return;
            }
        };

        let mut set = target
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if set.len() >= MAX_INDICATORS {
            tracing::warn!(max = MAX_INDICATORS, "intel index full, dropping indicator");
            return;
        }
        set.insert(record.indicator.clone());
    }

    /// 이벤트가 알려진 지표와 일치하는지 확인합니다.
    ///
    /// 출발지 주소 또는 기법 태그 중 하나라도 일치하면 true입니다.
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(addr) = event.origin.source_address {
            let addresses = self
                .addresses
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if addresses.contains(&addr.to_string()) {
                return true;
            }
        }

        if !event.techniques.is_empty() {
            let techniques = self
                .techniques
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if event.techniques.iter().any(|t| techniques.contains(t)) {
                return true;
            }
        }

        false
    }

    /// 등록된 지표 수를 반환합니다.
    pub fn len(&self) -> usize {
        let addresses = self
            .addresses
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let techniques = self
            .techniques
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        addresses.len() + techniques.len()
    }

    /// 인덱스가 비었는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridwatch_core::types::{EventOrigin, Severity};

    fn intel(indicator: &str, indicator_type: &str) -> ThreatIntelRecord {
        ThreatIntelRecord {
            id: "ti-1".to_owned(),
            indicator: indicator.to_owned(),
            indicator_type: indicator_type.to_owned(),
            confidence: 0.9,
            source: "osint".to_owned(),
            added_at: Utc::now(),
        }
    }

    fn event_with(addr: Option<&str>, techniques: &[&str]) -> SecurityEvent {
        SecurityEvent {
            id: "evt-1".to_owned(),
            name: "test".to_owned(),
            category: "test".to_owned(),
            severity: Severity::Low,
            timestamp: Utc::now(),
            origin: EventOrigin {
                vendor: "acme".to_owned(),
                product: "gate".to_owned(),
                source_address: addr.map(|a| a.parse().unwrap()),
                ..Default::default()
            },
            attributes: vec![],
            techniques: techniques.iter().map(|t| (*t).to_owned()).collect(),
            kill_chain_phase: None,
            risk_score: None,
        }
    }

    #[test]
    fn matches_known_address() {
        let index = ThreatIntelIndex::new();
        index.insert(&intel("203.0.113.7", "address"));

        assert!(index.matches(&event_with(Some("203.0.113.7"), &[])));
        assert!(!index.matches(&event_with(Some("198.51.100.1"), &[])));
        assert!(!index.matches(&event_with(None, &[])));
    }

    #[test]
    fn matches_known_technique() {
        let index = ThreatIntelIndex::new();
        index.insert(&intel("T1486", "technique"));

        assert!(index.matches(&event_with(None, &["T1486"])));
        assert!(index.matches(&event_with(None, &["T1059", "T1486"])));
        assert!(!index.matches(&event_with(None, &["T1059"])));
    }

    #[test]
    fn ip_alias_accepted() {
        let index = ThreatIntelIndex::new();
        index.insert(&intel("10.0.0.1", "ip"));
        assert!(index.matches(&event_with(Some("10.0.0.1"), &[])));
    }

    #[test]
    fn unsupported_indicator_type_ignored() {
        let index = ThreatIntelIndex::new();
        index.insert(&intel("deadbeef", "hash"));
        assert!(index.is_empty());
    }

    #[test]
    fn len_counts_both_sets() {
        let index = ThreatIntelIndex::new();
        index.insert(&intel("10.0.0.1", "address"));
        index.insert(&intel("T1486", "technique"));
        assert_eq!(index.len(), 2);
    }
}
