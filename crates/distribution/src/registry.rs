//! 구독자 레지스트리와 팬아웃 배포
//!
//! [`Distributor`]는 살아있는 구독자 목록을 관리하고, 발행되는 모든
//! 아이템을 스코프/필터를 통과한 구독자에게 푸시합니다.
//!
//! # 전달 격리
//! 구독자별 전달 경로는 독립적으로 바운딩됩니다: 각 구독자는 고정
//! 용량의 메일박스(mpsc)를 가지며, 메일박스가 가득 찬 구독자는 즉시
//! 해제됩니다. 느린 소비자 하나가 파이프라인이나 다른 구독자를
//! 지연시키지 않습니다.
//!
//! # 구독 생명주기
//! 구독은 열린 동안만 아이템을 전달받습니다 — 연결 전에 발행된
//! 아이템의 소급 재생은 없습니다. 닫기는 이후 아이템에 즉시 적용되며,
//! 이미 큐에 쌓인 아이템은 드레인하지 않습니다.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use gridwatch_core::metrics as m;

use crate::filter::SubscriptionFilter;
use crate::scope::PermissionScope;
use crate::topic::{OutboundItem, Topic};

/// 구독 핸들
///
/// 핸들을 통해 구독을 닫을 수 있습니다. 핸들이 드롭되어도 구독은
/// 유지됩니다 — 명시적으로 `close()`를 호출하거나 수신측을 드롭해야
/// 합니다.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    closed: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// 구독 ID를 반환합니다.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 구독을 닫습니다. 이후 발행되는 아이템에 즉시 적용됩니다.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// 구독이 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// 구독자 엔트리
struct SubscriberEntry {
    id: u64,
    topic: Topic,
    scope: PermissionScope,
    filter: SubscriptionFilter,
    tx: mpsc::Sender<OutboundItem>,
    closed: Arc<AtomicBool>,
}

/// 배포기 — 구독자 레지스트리 + 팬아웃
///
/// `&self` API이므로 `Arc`로 감싸 스테이지와 데몬이 공유합니다.
pub struct Distributor {
    /// 구독자 목록
    subscribers: RwLock<Vec<SubscriberEntry>>,
    /// 구독자별 메일박스 용량
    mailbox_capacity: usize,
    /// 구독 ID 시퀀스
    next_id: AtomicU64,
    /// 전달된 아이템 수
    delivered: AtomicU64,
    /// 스코프/필터로 걸러진 전달 시도 수
    filtered: AtomicU64,
    /// 강제 해제된 구독자 수
    disconnected: AtomicU64,
}

impl Distributor {
    /// 새 배포기를 생성합니다.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            mailbox_capacity: mailbox_capacity.max(1),
            next_id: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            disconnected: AtomicU64::new(0),
        }
    }

    /// 구독을 엽니다.
    ///
    /// 반환된 수신 채널은 구독이 열린 이후 발행되는 매칭 아이템만
    /// 전달합니다. 스코프가 토픽을 허용하지 않으면 아무것도 전달되지
    /// 않습니다 (조용한 거부).
    pub fn open_subscription(
        &self,
        topic: Topic,
        filter: SubscriptionFilter,
        scope: PermissionScope,
    ) -> (SubscriptionHandle, mpsc::Receiver<OutboundItem>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let closed = Arc::new(AtomicBool::new(false));

        let entry = SubscriberEntry {
            id,
            topic,
            scope,
            filter,
            tx,
            closed: Arc::clone(&closed),
        };

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.push(entry);

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::DISTRIBUTION_ACTIVE_SUBSCRIBERS).set(subscribers.len() as f64);

        tracing::info!(subscription_id = id, topic = %topic, "subscription opened");

        (SubscriptionHandle { id, closed }, rx)
    }

    /// 아이템을 발행합니다.
    ///
    /// 아이템의 토픽을 구독한 모든 구독자에 대해 스코프를 먼저
    /// 검사하고(필터보다 앞서, 조용히 거부), 그 다음 필터를 평가하여
    /// 양쪽을 통과한 구독자에게만 전달합니다.
    pub fn publish(&self, item: &OutboundItem) {
        let topic = item.topic();
        let mut needs_prune = false;

        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            for entry in subscribers.iter().filter(|e| e.topic == topic) {
                if entry.closed.load(Ordering::Relaxed) {
                    needs_prune = true;
                    continue;
                }

                // 스코프 먼저 — 권한 없는 호출자에게는 필터 평가 없이 조용히 거부
                if !entry.scope.allows(topic) {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::DISTRIBUTION_FILTERED_TOTAL).increment(1);
                    continue;
                }

                if !entry.filter.matches(item) {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::DISTRIBUTION_FILTERED_TOTAL).increment(1);
                    continue;
                }

                match entry.tx.try_send(item.clone()) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(
                            m::DISTRIBUTION_DELIVERED_TOTAL,
                            m::LABEL_TOPIC => topic.as_str()
                        )
                        .increment(1);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // 느린 소비자 격리: 메일박스 초과 시 해당 구독자만 해제
                        entry.closed.store(true, Ordering::Relaxed);
                        self.disconnected.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(m::DISTRIBUTION_DISCONNECTED_TOTAL).increment(1);
                        needs_prune = true;
                        tracing::warn!(
                            subscription_id = entry.id,
                            topic = %topic,
                            capacity = self.mailbox_capacity,
                            "subscriber mailbox full, disconnecting slow consumer"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        entry.closed.store(true, Ordering::Relaxed);
                        needs_prune = true;
                        tracing::debug!(
                            subscription_id = entry.id,
                            "subscriber receiver dropped, removing"
                        );
                    }
                }
            }
        }

        if needs_prune {
            self.prune_closed();
        }
    }

    /// 닫힌 구독자를 레지스트리에서 제거합니다.
    fn prune_closed(&self) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|entry| !entry.closed.load(Ordering::Relaxed) && !entry.tx.is_closed());
        let removed = before - subscribers.len();
        if removed > 0 {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DISTRIBUTION_ACTIVE_SUBSCRIBERS).set(subscribers.len() as f64);
            tracing::debug!(removed, remaining = subscribers.len(), "pruned subscribers");
        }
    }

    /// 살아있는 구독자 수를 반환합니다.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// 전달된 아이템 수를 반환합니다.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// 스코프/필터로 걸러진 전달 시도 수를 반환합니다.
    pub fn filtered_count(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// 강제 해제된 구독자 수를 반환합니다.
    pub fn disconnected_count(&self) -> u64 {
        self.disconnected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Capability;
    use chrono::Utc;
    use gridwatch_core::types::{EventOrigin, SecurityEvent, Severity};

    fn sample_event(severity: Severity) -> SecurityEvent {
        SecurityEvent {
            id: "evt-1".to_owned(),
            name: "test".to_owned(),
            category: "test".to_owned(),
            severity,
            timestamp: Utc::now(),
            origin: EventOrigin {
                vendor: "acme".to_owned(),
                product: "gate".to_owned(),
                ..Default::default()
            },
            attributes: vec![],
            techniques: vec![],
            kill_chain_phase: None,
            risk_score: None,
        }
    }

    fn event_scope() -> PermissionScope {
        PermissionScope::with_capabilities([Capability::ReadSecurityEvents])
    }

    #[tokio::test]
    async fn matching_subscriber_receives_item() {
        let distributor = Distributor::new(16);
        let (_handle, mut rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );

        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));

        let item = rx.try_recv().unwrap();
        assert!(matches!(item, OutboundItem::Event(_)));
        assert_eq!(distributor.delivered_count(), 1);
    }

    #[tokio::test]
    async fn no_retroactive_replay() {
        let distributor = Distributor::new(16);
        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));

        let (_handle, mut rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_capability_silently_rejected() {
        let distributor = Distributor::new(16);
        // critical-alerts 능력 없이 critical-alerts 토픽 구독
        let (_handle, mut rx) = distributor.open_subscription(
            Topic::CriticalAlerts,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );

        let alert = gridwatch_core::types::Alert {
            id: "alert-1".to_owned(),
            severity: Severity::Critical,
            source: gridwatch_core::types::AlertSource::Event {
                event: sample_event(Severity::Critical),
            },
            reasoning: "critical severity".to_owned(),
            actions: vec![],
            escalation_required: false,
            created_at: Utc::now(),
        };
        distributor.publish(&OutboundItem::Alert(alert));

        assert!(rx.try_recv().is_err());
        assert_eq!(distributor.delivered_count(), 0);
        assert_eq!(distributor.filtered_count(), 1);
    }

    #[tokio::test]
    async fn predicate_rejection_counts_as_filtered() {
        let distributor = Distributor::new(16);
        let filter = SubscriptionFilter {
            severities: Some(vec![Severity::Critical]),
            ..Default::default()
        };
        let (_handle, mut rx) =
            distributor.open_subscription(Topic::RawEvents, filter, event_scope());

        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));
        assert!(rx.try_recv().is_err());
        assert_eq!(distributor.filtered_count(), 1);
    }

    #[tokio::test]
    async fn topic_isolation() {
        let distributor = Distributor::new(16);
        let (_handle, mut rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            PermissionScope::all(),
        );

        // 다른 토픽의 아이템은 전달되지 않음
        distributor.publish(&OutboundItem::Health(crate::topic::HealthUpdate {
            status: "healthy".to_owned(),
            detail: String::new(),
            reported_at: Utc::now(),
        }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_consumer_disconnected_without_blocking_others() {
        let distributor = Distributor::new(2);
        // 느린 소비자: 메일박스를 비우지 않음
        let (_slow_handle, _slow_rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );
        // 정상 소비자
        let (_fast_handle, mut fast_rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );

        // 정상 소비자는 매 발행마다 메일박스를 비움
        let mut received = 0;
        for _ in 0..5 {
            distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));
            while fast_rx.try_recv().is_ok() {
                received += 1;
            }
        }

        // 느린 소비자는 용량 2 초과 시점에 해제됨
        assert_eq!(distributor.disconnected_count(), 1);
        assert_eq!(distributor.subscriber_count(), 1);
        // 정상 소비자는 모든 아이템을 받음
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn close_takes_effect_immediately() {
        let distributor = Distributor::new(16);
        let (handle, mut rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );

        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));
        handle.close();
        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));

        // 닫기 전 아이템은 큐에 남아 있고, 닫은 후 아이템은 전달되지 않음
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(distributor.delivered_count(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_pruned_on_publish() {
        let distributor = Distributor::new(16);
        let (_handle, rx) = distributor.open_subscription(
            Topic::RawEvents,
            SubscriptionFilter::accept_all(),
            event_scope(),
        );
        assert_eq!(distributor.subscriber_count(), 1);

        drop(rx);
        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));
        assert_eq!(distributor.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_fan_out() {
        let distributor = Distributor::new(16);
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (_handle, rx) = distributor.open_subscription(
                Topic::RawEvents,
                SubscriptionFilter::accept_all(),
                event_scope(),
            );
            receivers.push(rx);
        }

        distributor.publish(&OutboundItem::Event(sample_event(Severity::Low)));

        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
        assert_eq!(distributor.delivered_count(), 4);
    }
}
