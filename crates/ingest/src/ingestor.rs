//! 수집 루프 — 원시 레코드 수신, 디코딩, 핸들러 디스패치
//!
//! [`Ingestor`]는 데몬이 조립한 `tokio::mpsc` 채널에서 [`RawRecord`]를
//! 수신하여 디코딩한 뒤, 채널별로 정확히 하나의 다운스트림 핸들러에
//! 전달합니다.
//!
//! # 에러 정책
//! - 디코딩 실패: 해당 레코드 하나만 드롭하고 계속 진행 (치명적이지 않음)
//! - 다운스트림 채널 닫힘: 파이프라인 종료 신호로 간주하고 루프를 종료
//!
//! # 아키텍처 원칙
//! ingest는 correlation/alert/distribution에 직접 의존하지 않습니다.
//! `gridwatch-daemon`이 채널을 생성하여 스테이지를 연결합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gridwatch_core::event::StreamEvent;
use gridwatch_core::types::ThreatIntelRecord;
use gridwatch_core::metrics as m;

use crate::decoder::RecordDecoder;
use crate::error::IngestError;
use crate::record::{ChannelRecord, RawRecord};

/// 수집 카운터 — 파이프라인과 수집 태스크가 공유합니다.
#[derive(Debug, Default)]
pub struct IngestCounters {
    /// 수신한 레코드 수
    pub received: AtomicU64,
    /// 디코딩 실패로 드롭된 레코드 수
    pub decode_errors: AtomicU64,
}

/// 스트림 수집기
///
/// 원시 레코드를 디코딩하여 다운스트림으로 라우팅합니다.
/// 보안 이벤트는 상관 분석 스테이지와 배포 레이어(원시 스트림 토픽) 양쪽으로,
/// 위협 인텔리전스는 알림 스테이지의 인덱스와 배포 레이어로 전달됩니다.
pub struct Ingestor {
    /// 원시 레코드 수신 채널
    raw_rx: mpsc::Receiver<RawRecord>,
    /// 레코드 디코더
    decoder: RecordDecoder,
    /// 보안 이벤트 전송 채널 (-> correlation)
    event_tx: mpsc::Sender<StreamEvent>,
    /// 위협 인텔리전스 전송 채널 (-> alert)
    intel_tx: mpsc::Sender<ThreatIntelRecord>,
    /// 디코딩된 레코드 전송 채널 (-> distribution)
    publish_tx: mpsc::Sender<ChannelRecord>,
    /// 공유 카운터
    counters: Arc<IngestCounters>,
}

impl Ingestor {
    /// 새 수집기를 생성합니다.
    pub fn new(
        raw_rx: mpsc::Receiver<RawRecord>,
        decoder: RecordDecoder,
        event_tx: mpsc::Sender<StreamEvent>,
        intel_tx: mpsc::Sender<ThreatIntelRecord>,
        publish_tx: mpsc::Sender<ChannelRecord>,
        counters: Arc<IngestCounters>,
    ) -> Self {
        Self {
            raw_rx,
            decoder,
            event_tx,
            intel_tx,
            publish_tx,
            counters,
        }
    }

    /// 수집 루프를 실행합니다.
    ///
    /// 송신 측 채널이 닫히거나 cancellation token이 발동되면 종료되고
    /// raw_rx를 반환하여 재시작을 지원합니다.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawRecord>, IngestError> {
        tracing::info!("starting stream ingestor");

        loop {
            tokio::select! {
                result = self.raw_rx.recv() => {
                    match result {
                        Some(raw) => self.handle_record(raw).await?,
                        None => {
                            tracing::info!("raw record channel closed, shutting down ingestor");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("ingestor received shutdown signal");
                    break;
                }
            }
        }

        Ok(self.raw_rx)
    }

    /// 단일 레코드를 디코딩하고 디스패치합니다.
    ///
    /// 디코딩 실패는 로깅 후 드롭하며 에러를 반환하지 않습니다.
    async fn handle_record(&mut self, raw: RawRecord) -> Result<(), IngestError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::INGEST_RECORDS_TOTAL, m::LABEL_CHANNEL => raw.channel.clone())
            .increment(1);

        let record = match self.decoder.decode(&raw) {
            Ok(record) => record,
            Err(e) => {
                // 단일 레코드 드롭 — 채널은 계속 동작
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    m::INGEST_DECODE_ERRORS_TOTAL,
                    m::LABEL_CHANNEL => raw.channel.clone()
                )
                .increment(1);
                tracing::warn!(
                    channel = %raw.channel,
                    error = %e,
                    "failed to decode inbound record, dropping"
                );
                return Ok(());
            }
        };

        self.dispatch(record).await
    }

    /// 디코딩된 레코드를 채널별 핸들러로 전달합니다.
    ///
    /// 각 레코드는 정확히 하나의 주 핸들러로 전달되며, 보안 이벤트와
    /// 위협 인텔리전스는 배포 레이어에도 함께 전달됩니다.
    async fn dispatch(&mut self, record: ChannelRecord) -> Result<(), IngestError> {
        match record {
            ChannelRecord::Event(event) => {
                let stream_event = StreamEvent::new(event.clone());
                tracing::debug!(
                    event_id = %event.id,
                    name = %event.name,
                    trace_id = %stream_event.metadata.trace_id,
                    "routing security event"
                );
                self.event_tx
                    .send(stream_event)
                    .await
                    .map_err(|e| IngestError::Channel(e.to_string()))?;
                self.publish(ChannelRecord::Event(event)).await
            }
            ChannelRecord::ThreatIntel(intel) => {
                self.intel_tx
                    .send(intel.clone())
                    .await
                    .map_err(|e| IngestError::Channel(e.to_string()))?;
                self.publish(ChannelRecord::ThreatIntel(intel)).await
            }
            other @ (ChannelRecord::AttackPattern(_)
            | ChannelRecord::Ioc(_)
            | ChannelRecord::Case(_)
            | ChannelRecord::Playbook(_)) => self.publish(other).await,
        }
    }

    async fn publish(&mut self, record: ChannelRecord) -> Result<(), IngestError> {
        self.publish_tx
            .send(record)
            .await
            .map_err(|e| IngestError::Channel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn event_payload() -> Bytes {
        Bytes::from_static(
            br#"{
                "id": "evt-1",
                "name": "failed-login",
                "category": "authentication",
                "severity": "high",
                "timestamp": "2025-06-01T10:00:00Z",
                "origin": {"vendor": "acme", "product": "gatekeeper"}
            }"#,
        )
    }

    struct Harness {
        raw_tx: mpsc::Sender<RawRecord>,
        event_rx: mpsc::Receiver<StreamEvent>,
        intel_rx: mpsc::Receiver<ThreatIntelRecord>,
        publish_rx: mpsc::Receiver<ChannelRecord>,
        counters: Arc<IngestCounters>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<Result<mpsc::Receiver<RawRecord>, IngestError>>,
    }

    fn spawn_ingestor() -> Harness {
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let (intel_tx, intel_rx) = mpsc::channel(16);
        let (publish_tx, publish_rx) = mpsc::channel(16);
        let counters = Arc::new(IngestCounters::default());
        let ingestor = Ingestor::new(
            raw_rx,
            RecordDecoder::new(1024 * 1024),
            event_tx,
            intel_tx,
            publish_tx,
            Arc::clone(&counters),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ingestor.run(cancel.clone()));
        Harness {
            raw_tx,
            event_rx,
            intel_rx,
            publish_rx,
            counters,
            cancel,
            handle,
        }
    }

    #[tokio::test]
    async fn event_routed_to_correlation_and_raw_stream() {
        let mut h = spawn_ingestor();

        h.raw_tx
            .send(RawRecord::new("security-events", event_payload()))
            .await
            .unwrap();

        let stream_event =
            tokio::time::timeout(std::time::Duration::from_millis(100), h.event_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stream_event.event.name, "failed-login");

        let published =
            tokio::time::timeout(std::time::Duration::from_millis(100), h.publish_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(matches!(published, ChannelRecord::Event(_)));

        h.cancel.cancel();
        let _ = h.handle.await;
    }

    #[tokio::test]
    async fn intel_routed_to_alert_index_and_topic() {
        let mut h = spawn_ingestor();

        let json = br#"{
            "id": "ti-1",
            "indicator": "203.0.113.7",
            "indicator_type": "address",
            "confidence": 0.8,
            "source": "osint",
            "added_at": "2025-06-01T00:00:00Z"
        }"#;
        h.raw_tx
            .send(RawRecord::new(
                "threat-intelligence",
                Bytes::from_static(json),
            ))
            .await
            .unwrap();

        let intel =
            tokio::time::timeout(std::time::Duration::from_millis(100), h.intel_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(intel.indicator, "203.0.113.7");

        let published =
            tokio::time::timeout(std::time::Duration::from_millis(100), h.publish_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(matches!(published, ChannelRecord::ThreatIntel(_)));

        h.cancel.cancel();
        let _ = h.handle.await;
    }

    #[tokio::test]
    async fn malformed_record_dropped_without_halting_channel() {
        let mut h = spawn_ingestor();

        // 깨진 레코드 후 정상 레코드
        h.raw_tx
            .send(RawRecord::new("security-events", Bytes::from_static(b"%%%")))
            .await
            .unwrap();
        h.raw_tx
            .send(RawRecord::new("security-events", event_payload()))
            .await
            .unwrap();

        // 정상 레코드는 여전히 도착해야 함
        let stream_event =
            tokio::time::timeout(std::time::Duration::from_millis(200), h.event_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stream_event.event.id, "evt-1");
        assert_eq!(h.counters.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(h.counters.received.load(Ordering::Relaxed), 2);

        h.cancel.cancel();
        let _ = h.handle.await;
    }

    #[tokio::test]
    async fn unknown_channel_dropped() {
        let mut h = spawn_ingestor();

        h.raw_tx
            .send(RawRecord::new("telemetry", Bytes::from_static(b"{}")))
            .await
            .unwrap();
        h.raw_tx
            .send(RawRecord::new("security-events", event_payload()))
            .await
            .unwrap();

        let stream_event =
            tokio::time::timeout(std::time::Duration::from_millis(200), h.event_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stream_event.event.id, "evt-1");
        assert_eq!(h.counters.decode_errors.load(Ordering::Relaxed), 1);

        h.cancel.cancel();
        let _ = h.handle.await;
    }

    #[tokio::test]
    async fn ingestor_stops_when_raw_channel_closed() {
        let h = spawn_ingestor();
        drop(h.raw_tx);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(1), h.handle).await;
        assert!(result.is_ok(), "ingestor should stop when channel closes");
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn case_record_published_only() {
        let mut h = spawn_ingestor();

        let json = br#"{
            "case_id": "case-3",
            "title": "Phishing wave",
            "status": "open",
            "assignee": "alice",
            "updated_at": "2025-06-01T12:00:00Z"
        }"#;
        h.raw_tx
            .send(RawRecord::new("case-updates", Bytes::from_static(json)))
            .await
            .unwrap();

        let published =
            tokio::time::timeout(std::time::Duration::from_millis(100), h.publish_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(matches!(published, ChannelRecord::Case(_)));

        // 이벤트/인텔 채널로는 아무것도 가지 않음
        assert!(h.event_rx.try_recv().is_err());
        assert!(h.intel_rx.try_recv().is_err());

        h.cancel.cancel();
        let _ = h.handle.await;
    }
}
