//! 권장 대응 조치 -- 이벤트 이름/분류 키워드 매칭
//!
//! 실행이 아닌 권고만 생성합니다. 조회 실패는 빈 목록으로 강등되며
//! 알림 발행을 막지 않습니다.

use gridwatch_core::types::{RecommendedAction, SecurityEvent, Severity};

/// 악성코드 관련 이름 키워드
const MALWARE_KEYWORDS: &[&str] = &["malware", "ransomware", "trojan", "virus", "worm", "rootkit"];

/// 이벤트에 대한 권장 대응 조치를 생성합니다.
///
/// - 악성코드 관련 이름: 호스트 격리 + 정밀 검사 + 샘플 수집
/// - 치명적 이벤트에 출발지 주소 존재: 주소 차단 + 트래픽 조사
/// - 행위자 존재: 계정 검토 + 정지 검토
pub fn recommend(event: &SecurityEvent) -> Vec<RecommendedAction> {
    let mut actions = Vec::new();
    let name = event.name.to_lowercase();

    if MALWARE_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        actions.push(RecommendedAction::IsolateHost);
        actions.push(RecommendedAction::RunMalwareScan);
        actions.push(RecommendedAction::CollectSamples);
    }

    if let Some(addr) = event.origin.source_address
        && event.severity == Severity::Critical
    {
        actions.push(RecommendedAction::BlockAddress(addr));
        actions.push(RecommendedAction::InspectTraffic(addr));
    }

    if let Some(ref actor) = event.origin.actor {
        actions.push(RecommendedAction::ReviewAccount(actor.clone()));
        actions.push(RecommendedAction::ConsiderSuspension(actor.clone()));
    }

    actions
}
