//! 알림 스테이지 오케스트레이션 — Pipeline trait 구현
//!
//! 세 입력 채널(전달된 이벤트, 상관 결과, 인텔리전스)을 하나의 루프에서
//! 소비합니다. 상관 결과는 처리 후 배포 레이어로 그대로 전달되어
//! event-correlations 토픽 구독자에게 도달합니다.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gridwatch_core::error::GridwatchError;
use gridwatch_core::event::{AlertEvent, CorrelationEvent, EscalationEvent, StreamEvent};
use gridwatch_core::pipeline::{HealthStatus, Pipeline};
use gridwatch_core::types::ThreatIntelRecord;

use crate::error::AlertError;
use crate::intel::ThreatIntelIndex;
use crate::processor::AlertProcessor;

/// 스테이지 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum StageState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 알림 스테이지 입력/출력 채널 묶음
struct StageChannels {
    event_rx: mpsc::Receiver<StreamEvent>,
    result_rx: mpsc::Receiver<CorrelationEvent>,
    intel_rx: mpsc::Receiver<ThreatIntelRecord>,
    alert_tx: mpsc::Sender<AlertEvent>,
    escalation_tx: mpsc::Sender<EscalationEvent>,
    correlation_tx: mpsc::Sender<CorrelationEvent>,
}

/// 알림 스테이지
pub struct AlertPipeline {
    state: StageState,
    /// 공유 처리기
    processor: Arc<AlertProcessor>,
    /// 인텔리전스 인덱스 (처리기와 공유)
    intel: Arc<ThreatIntelIndex>,
    /// 채널 묶음 (start 시 태스크로 이동)
    channels: Option<StageChannels>,
    /// 취소 토큰
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들
    task: Option<tokio::task::JoinHandle<()>>,
}

impl AlertPipeline {
    /// 공유 처리기에 대한 참조를 반환합니다.
    pub fn processor(&self) -> &Arc<AlertProcessor> {
        &self.processor
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Stopped => "stopped",
        }
    }

    /// 처리 루프 — 세 입력 채널을 select로 소비합니다.
    async fn run(
        processor: Arc<AlertProcessor>,
        intel: Arc<ThreatIntelIndex>,
        mut channels: StageChannels,
        cancel: CancellationToken,
    ) {
        tracing::info!("alert stage loop started");

        loop {
            tokio::select! {
                event = channels.event_rx.recv() => {
                    let Some(stream_event) = event else { break };
                    if let Some(alert) = processor.process_event(&stream_event.event) {
                        let escalate = alert.escalation_required;
                        let alert_id = alert.id.clone();
                        let alert_event =
                            AlertEvent::with_trace(alert, stream_event.metadata.trace_id.clone());
                        if channels.alert_tx.send(alert_event).await.is_err() {
                            tracing::warn!("alert channel closed, stopping alert stage");
                            break;
                        }
                        if escalate
                            && Self::send_escalation(&channels.escalation_tx, &alert_id)
                                .await
                                .is_err()
                        {
                            break;
                        }
                    }
                }
                result = channels.result_rx.recv() => {
                    let Some(correlation_event) = result else { break };
                    if let Some(alert) =
                        processor.process_correlation(correlation_event.result.clone())
                    {
                        let escalate = alert.escalation_required;
                        let alert_id = alert.id.clone();
                        let alert_event = AlertEvent::with_trace(
                            alert,
                            correlation_event.metadata.trace_id.clone(),
                        );
                        if channels.alert_tx.send(alert_event).await.is_err() {
                            tracing::warn!("alert channel closed, stopping alert stage");
                            break;
                        }
                        if escalate
                            && Self::send_escalation(&channels.escalation_tx, &alert_id)
                                .await
                                .is_err()
                        {
                            break;
                        }
                    }
                    // 상관 결과는 처리 후 배포 레이어로 전달
                    if channels.correlation_tx.send(correlation_event).await.is_err() {
                        tracing::warn!("correlation pass-through channel closed");
                        break;
                    }
                }
                intel_record = channels.intel_rx.recv() => {
                    let Some(record) = intel_record else { break };
                    tracing::debug!(
                        indicator = %record.indicator,
                        indicator_type = %record.indicator_type,
                        "threat intel indicator indexed"
                    );
                    intel.insert(&record);
                }
                _ = cancel.cancelled() => {
                    tracing::info!("alert stage received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("alert stage loop stopped");
    }

    async fn send_escalation(
        escalation_tx: &mpsc::Sender<EscalationEvent>,
        alert_id: &str,
    ) -> Result<(), ()> {
        let escalation = EscalationEvent::new(alert_id, "escalation required");
        if escalation_tx.send(escalation).await.is_err() {
            tracing::warn!("escalation channel closed, stopping alert stage");
            return Err(());
        }
        Ok(())
    }
}

impl Pipeline for AlertPipeline {
    async fn start(&mut self) -> Result<(), GridwatchError> {
        if self.state == StageState::Running {
            return Err(gridwatch_core::error::PipelineError::AlreadyRunning.into());
        }

        let channels = self.channels.take().ok_or_else(|| {
            GridwatchError::Pipeline(gridwatch_core::error::PipelineError::InitFailed(
                "alert stage channels already consumed".to_owned(),
            ))
        })?;

        tracing::info!("starting alert stage");
        self.task = Some(tokio::spawn(Self::run(
            Arc::clone(&self.processor),
            Arc::clone(&self.intel),
            channels,
            self.cancel.clone(),
        )));
        self.state = StageState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GridwatchError> {
        if self.state != StageState::Running {
            return Err(gridwatch_core::error::PipelineError::NotRunning.into());
        }

        tracing::info!("stopping alert stage");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = StageState::Stopped;
        tracing::info!("alert stage stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            StageState::Running => {
                if self.processor.is_degraded() {
                    HealthStatus::Degraded("suppression path degraded".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            StageState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            StageState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 알림 스테이지 빌더
pub struct AlertPipelineBuilder {
    processor: Option<Arc<AlertProcessor>>,
    intel: Option<Arc<ThreatIntelIndex>>,
    event_rx: Option<mpsc::Receiver<StreamEvent>>,
    result_rx: Option<mpsc::Receiver<CorrelationEvent>>,
    intel_rx: Option<mpsc::Receiver<ThreatIntelRecord>>,
    alert_tx: Option<mpsc::Sender<AlertEvent>>,
    escalation_tx: Option<mpsc::Sender<EscalationEvent>>,
    correlation_tx: Option<mpsc::Sender<CorrelationEvent>>,
}

impl AlertPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            processor: None,
            intel: None,
            event_rx: None,
            result_rx: None,
            intel_rx: None,
            alert_tx: None,
            escalation_tx: None,
            correlation_tx: None,
        }
    }

    /// 알림 처리기를 설정합니다.
    pub fn processor(mut self, processor: Arc<AlertProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// 인텔리전스 인덱스를 설정합니다 (처리기와 같은 인스턴스여야 함).
    pub fn intel_index(mut self, intel: Arc<ThreatIntelIndex>) -> Self {
        self.intel = Some(intel);
        self
    }

    /// 이벤트 수신 채널을 설정합니다 (correlation -> alert).
    pub fn event_receiver(mut self, rx: mpsc::Receiver<StreamEvent>) -> Self {
        self.event_rx = Some(rx);
        self
    }

    /// 상관 결과 수신 채널을 설정합니다.
    pub fn result_receiver(mut self, rx: mpsc::Receiver<CorrelationEvent>) -> Self {
        self.result_rx = Some(rx);
        self
    }

    /// 인텔리전스 수신 채널을 설정합니다 (ingest -> alert).
    pub fn intel_receiver(mut self, rx: mpsc::Receiver<ThreatIntelRecord>) -> Self {
        self.intel_rx = Some(rx);
        self
    }

    /// 알림 전송 채널을 설정합니다 (-> distribution).
    pub fn alert_sender(mut self, tx: mpsc::Sender<AlertEvent>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    /// 상위 보고 전송 채널을 설정합니다 (-> distribution).
    pub fn escalation_sender(mut self, tx: mpsc::Sender<EscalationEvent>) -> Self {
        self.escalation_tx = Some(tx);
        self
    }

    /// 상관 결과 전달 채널을 설정합니다 (-> distribution).
    pub fn correlation_sender(mut self, tx: mpsc::Sender<CorrelationEvent>) -> Self {
        self.correlation_tx = Some(tx);
        self
    }

    /// 스테이지를 빌드합니다.
    pub fn build(self) -> Result<AlertPipeline, AlertError> {
        let missing = |field: &str| AlertError::Config {
            field: field.to_owned(),
            reason: "required".to_owned(),
        };

        let processor = self.processor.ok_or_else(|| missing("processor"))?;
        let intel = self.intel.ok_or_else(|| missing("intel_index"))?;
        let channels = StageChannels {
            event_rx: self.event_rx.ok_or_else(|| missing("event_receiver"))?,
            result_rx: self.result_rx.ok_or_else(|| missing("result_receiver"))?,
            intel_rx: self.intel_rx.ok_or_else(|| missing("intel_receiver"))?,
            alert_tx: self.alert_tx.ok_or_else(|| missing("alert_sender"))?,
            escalation_tx: self
                .escalation_tx
                .ok_or_else(|| missing("escalation_sender"))?,
            correlation_tx: self
                .correlation_tx
                .ok_or_else(|| missing("correlation_sender"))?,
        };

        Ok(AlertPipeline {
            state: StageState::Initialized,
            processor,
            intel,
            channels: Some(channels),
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl Default for AlertPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gridwatch_core::types::{EventOrigin, SecurityEvent, Severity};

    struct Harness {
        pipeline: AlertPipeline,
        event_tx: mpsc::Sender<StreamEvent>,
        result_tx: mpsc::Sender<CorrelationEvent>,
        intel_tx: mpsc::Sender<ThreatIntelRecord>,
        alert_rx: mpsc::Receiver<AlertEvent>,
        escalation_rx: mpsc::Receiver<EscalationEvent>,
        correlation_rx: mpsc::Receiver<CorrelationEvent>,
    }

    fn build_harness() -> Harness {
        let intel = Arc::new(ThreatIntelIndex::new());
        let processor = Arc::new(AlertProcessor::new(
            vec![],
            300,
            10_000,
            Arc::clone(&intel),
        ));

        let (event_tx, event_rx) = mpsc::channel(16);
        let (result_tx, result_rx) = mpsc::channel(16);
        let (intel_tx, intel_rx) = mpsc::channel(16);
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let (escalation_tx, escalation_rx) = mpsc::channel(16);
        let (correlation_tx, correlation_rx) = mpsc::channel(16);

        let pipeline = AlertPipelineBuilder::new()
            .processor(processor)
            .intel_index(intel)
            .event_receiver(event_rx)
            .result_receiver(result_rx)
            .intel_receiver(intel_rx)
            .alert_sender(alert_tx)
            .escalation_sender(escalation_tx)
            .correlation_sender(correlation_tx)
            .build()
            .unwrap();

        Harness {
            pipeline,
            event_tx,
            result_tx,
            intel_tx,
            alert_rx,
            escalation_rx,
            correlation_rx,
        }
    }

    fn critical_event() -> SecurityEvent {
        SecurityEvent {
            id: "evt-crit".to_owned(),
            name: "ransomware-detected".to_owned(),
            category: "endpoint".to_owned(),
            severity: Severity::Critical,
            timestamp: Utc::now(),
            origin: EventOrigin {
                vendor: "acme".to_owned(),
                product: "endpoint-av".to_owned(),
                source_address: Some("192.168.1.100".parse().unwrap()),
                actor: None,
                resource: None,
                location: None,
            },
            attributes: vec![],
            techniques: vec![],
            kill_chain_phase: None,
            risk_score: Some(0.95),
        }
    }

    #[test]
    fn builder_requires_all_channels() {
        assert!(AlertPipelineBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn critical_event_produces_alert_and_escalation() {
        let mut h = build_harness();
        h.pipeline.start().await.unwrap();

        h.event_tx
            .send(StreamEvent::new(critical_event()))
            .await
            .unwrap();

        let alert =
            tokio::time::timeout(std::time::Duration::from_millis(500), h.alert_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(alert.alert.escalation_required);

        let escalation = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            h.escalation_rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(escalation.alert_id, alert.alert.id);

        h.pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn correlation_results_pass_through() {
        let mut h = build_harness();
        h.pipeline.start().await.unwrap();

        let mut event = critical_event();
        event.severity = Severity::Low;
        event.risk_score = None;
        let result = gridwatch_core::types::CorrelationResult {
            id: "cor-1".to_owned(),
            rule_id: "temporal-default".to_owned(),
            kind: gridwatch_core::types::CorrelationKind::Temporal,
            score: 0.3,
            primary: event.clone(),
            related: vec![event],
            detected_at: Utc::now(),
            summary: "3 related events".to_owned(),
        };
        h.result_tx
            .send(CorrelationEvent::new(result))
            .await
            .unwrap();

        // 상관 결과는 알림 판정과 무관하게 배포 레이어로 전달됨
        let passed = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            h.correlation_rx.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(passed.result.id, "cor-1");

        // 상관 결과는 항상 알림 후보이므로 알림도 발행됨
        let alert =
            tokio::time::timeout(std::time::Duration::from_millis(500), h.alert_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(!alert.alert.escalation_required);

        h.pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn intel_records_feed_index() {
        let mut h = build_harness();
        let intel_index = Arc::clone(&h.pipeline.intel);
        h.pipeline.start().await.unwrap();

        h.intel_tx
            .send(ThreatIntelRecord {
                id: "ti-1".to_owned(),
                indicator: "203.0.113.9".to_owned(),
                indicator_type: "address".to_owned(),
                confidence: 0.9,
                source: "osint".to_owned(),
                added_at: Utc::now(),
            })
            .await
            .unwrap();

        // 인덱스 반영 대기
        tokio::time::timeout(std::time::Duration::from_millis(500), async {
            while intel_index.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(intel_index.len(), 1);
        h.pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let mut h = build_harness();
        assert!(h.pipeline.stop().await.is_err());
        h.pipeline.start().await.unwrap();
        assert!(h.pipeline.start().await.is_err());
        h.pipeline.stop().await.unwrap();
    }
}
