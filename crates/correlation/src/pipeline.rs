//! 상관 분석 스테이지 오케스트레이션 — Pipeline trait 구현
//!
//! [`CorrelationPipeline`]은 워커 태스크 풀을 스폰하여 이벤트 채널을
//! 소비합니다. 워커들은 `Arc<CorrelationEngine>`을 공유하며, 엔진의
//! 키별 락이 같은 키의 평가를 직렬화하므로 워커 수만큼 서로 다른
//! 키가 동시에 평가됩니다.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use gridwatch_core::error::GridwatchError;
use gridwatch_core::event::{CorrelationEvent, StreamEvent};
use gridwatch_core::pipeline::{HealthStatus, Pipeline};

use crate::engine::CorrelationEngine;
use crate::error::CorrelationError;

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

/// 상관 분석 스테이지
pub struct CorrelationPipeline {
    state: StageState,
    /// 공유 엔진
    engine: Arc<CorrelationEngine>,
    /// 이벤트 수신 채널 (워커들이 공유)
    event_rx: Arc<Mutex<mpsc::Receiver<StreamEvent>>>,
    /// 상관 결과 전송 채널 (-> alert / distribution)
    result_tx: mpsc::Sender<CorrelationEvent>,
    /// 이벤트 전달 채널 (-> alert, 치명적 이벤트 트리거용)
    forward_tx: mpsc::Sender<StreamEvent>,
    /// 워커 수
    workers: usize,
    /// 취소 토큰
    cancel: CancellationToken,
    /// 워커 태스크 핸들
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl CorrelationPipeline {
    /// 공유 엔진에 대한 참조를 반환합니다.
    pub fn engine(&self) -> &Arc<CorrelationEngine> {
        &self.engine
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Stopped => "stopped",
        }
    }

    /// 워커 루프 — 이벤트를 수신하여 엔진에 전달하고 결과를 내보냅니다.
    async fn worker_loop(
        worker_id: usize,
        engine: Arc<CorrelationEngine>,
        event_rx: Arc<Mutex<mpsc::Receiver<StreamEvent>>>,
        result_tx: mpsc::Sender<CorrelationEvent>,
        forward_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        tracing::debug!(worker_id, "correlation worker started");

        loop {
            // 수신 락은 recv 동안만 유지 — 평가는 락 밖에서 수행합니다.
            let received = {
                let mut rx = event_rx.lock().await;
                tokio::select! {
                    event = rx.recv() => event,
                    _ = cancel.cancelled() => None,
                }
            };

            let Some(stream_event) = received else {
                tracing::debug!(worker_id, "correlation worker shutting down");
                break;
            };

            let results = engine.process(&stream_event.event);
            for result in results {
                let correlation_event =
                    CorrelationEvent::with_trace(result, stream_event.metadata.trace_id.clone());
                if result_tx.send(correlation_event).await.is_err() {
                    tracing::warn!(worker_id, "result channel closed, stopping worker");
                    return;
                }
            }

            // 치명적 이벤트 트리거 판정을 위해 원본 이벤트를 알림 스테이지로 전달
            if forward_tx.send(stream_event).await.is_err() {
                tracing::warn!(worker_id, "forward channel closed, stopping worker");
                return;
            }
        }
    }
}

impl Pipeline for CorrelationPipeline {
    async fn start(&mut self) -> Result<(), GridwatchError> {
        if self.state == StageState::Running {
            return Err(gridwatch_core::error::PipelineError::AlreadyRunning.into());
        }

        tracing::info!(
            workers = self.workers,
            rules = self.engine.rule_count(),
            "starting correlation stage"
        );

        for worker_id in 0..self.workers {
            self.tasks.push(tokio::spawn(Self::worker_loop(
                worker_id,
                Arc::clone(&self.engine),
                Arc::clone(&self.event_rx),
                self.result_tx.clone(),
                self.forward_tx.clone(),
                self.cancel.clone(),
            )));
        }

        self.state = StageState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GridwatchError> {
        if self.state != StageState::Running {
            return Err(gridwatch_core::error::PipelineError::NotRunning.into());
        }

        tracing::info!("stopping correlation stage");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.state = StageState::Stopped;
        tracing::info!("correlation stage stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            StageState::Running => {
                let evaluated = self.engine.evaluated_count();
                let errors = self.engine.eval_error_count();
                if evaluated >= 100 && errors * 10 > evaluated {
                    HealthStatus::Degraded(format!(
                        "rule evaluation errors high: {errors}/{evaluated}"
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            StageState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            StageState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 상관 분석 스테이지 빌더
pub struct CorrelationPipelineBuilder {
    engine: Option<Arc<CorrelationEngine>>,
    event_rx: Option<mpsc::Receiver<StreamEvent>>,
    result_tx: Option<mpsc::Sender<CorrelationEvent>>,
    forward_tx: Option<mpsc::Sender<StreamEvent>>,
    workers: usize,
}

impl CorrelationPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            engine: None,
            event_rx: None,
            result_tx: None,
            forward_tx: None,
            workers: 4,
        }
    }

    /// 엔진을 설정합니다.
    pub fn engine(mut self, engine: Arc<CorrelationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 이벤트 수신 채널을 설정합니다 (ingest -> correlation).
    pub fn event_receiver(mut self, rx: mpsc::Receiver<StreamEvent>) -> Self {
        self.event_rx = Some(rx);
        self
    }

    /// 상관 결과 전송 채널을 설정합니다.
    pub fn result_sender(mut self, tx: mpsc::Sender<CorrelationEvent>) -> Self {
        self.result_tx = Some(tx);
        self
    }

    /// 이벤트 전달 채널을 설정합니다 (-> alert).
    pub fn forward_sender(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.forward_tx = Some(tx);
        self
    }

    /// 워커 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// 스테이지를 빌드합니다.
    pub fn build(self) -> Result<CorrelationPipeline, CorrelationError> {
        if self.workers == 0 {
            return Err(CorrelationError::Config {
                field: "workers".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let engine = self.engine.ok_or_else(|| CorrelationError::Config {
            field: "engine".to_owned(),
            reason: "engine is required".to_owned(),
        })?;
        let event_rx = self.event_rx.ok_or_else(|| CorrelationError::Config {
            field: "event_receiver".to_owned(),
            reason: "event receiver is required".to_owned(),
        })?;
        let result_tx = self.result_tx.ok_or_else(|| CorrelationError::Config {
            field: "result_sender".to_owned(),
            reason: "result sender is required".to_owned(),
        })?;
        let forward_tx = self.forward_tx.ok_or_else(|| CorrelationError::Config {
            field: "forward_sender".to_owned(),
            reason: "forward sender is required".to_owned(),
        })?;

        Ok(CorrelationPipeline {
            state: StageState::Initialized,
            engine,
            event_rx: Arc::new(Mutex::new(event_rx)),
            result_tx,
            forward_tx,
            workers: self.workers,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl Default for CorrelationPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;
    use chrono::Utc;
    use gridwatch_core::types::{EventOrigin, KillChain, SecurityEvent, Severity};

    fn sample_event(id: &str) -> SecurityEvent {
        SecurityEvent {
            id: id.to_owned(),
            name: "login".to_owned(),
            category: "authentication".to_owned(),
            severity: Severity::Medium,
            timestamp: Utc::now(),
            origin: EventOrigin {
                vendor: "acme".to_owned(),
                product: "gatekeeper".to_owned(),
                source_address: Some("192.168.1.100".parse().unwrap()),
                actor: None,
                resource: None,
                location: None,
            },
            attributes: vec![],
            techniques: vec![],
            kill_chain_phase: None,
            risk_score: None,
        }
    }

    fn build_stage() -> (
        CorrelationPipeline,
        mpsc::Sender<StreamEvent>,
        mpsc::Receiver<CorrelationEvent>,
        mpsc::Receiver<StreamEvent>,
    ) {
        let engine = Arc::new(
            CorrelationEngine::new(default_rules(), KillChain::default(), 1000).unwrap(),
        );
        let (event_tx, event_rx) = mpsc::channel(64);
        let (result_tx, result_rx) = mpsc::channel(64);
        let (forward_tx, forward_rx) = mpsc::channel(64);
        let pipeline = CorrelationPipelineBuilder::new()
            .engine(engine)
            .event_receiver(event_rx)
            .result_sender(result_tx)
            .forward_sender(forward_tx)
            .workers(2)
            .build()
            .unwrap();
        (pipeline, event_tx, result_rx, forward_rx)
    }

    #[test]
    fn builder_requires_engine() {
        let (_tx, rx) = mpsc::channel(1);
        let (result_tx, _) = mpsc::channel(1);
        let (forward_tx, _) = mpsc::channel(1);
        let result = CorrelationPipelineBuilder::new()
            .event_receiver(rx)
            .result_sender(result_tx)
            .forward_sender(forward_tx)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let engine = Arc::new(
            CorrelationEngine::new(default_rules(), KillChain::default(), 1000).unwrap(),
        );
        let (_tx, rx) = mpsc::channel(1);
        let (result_tx, _) = mpsc::channel(1);
        let (forward_tx, _) = mpsc::channel(1);
        let result = CorrelationPipelineBuilder::new()
            .engine(engine)
            .event_receiver(rx)
            .result_sender(result_tx)
            .forward_sender(forward_tx)
            .workers(0)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn events_flow_through_stage() {
        let (mut pipeline, event_tx, mut result_rx, mut forward_rx) = build_stage();
        pipeline.start().await.unwrap();

        event_tx
            .send(StreamEvent::new(sample_event("evt-1")))
            .await
            .unwrap();
        event_tx
            .send(StreamEvent::new(sample_event("evt-2")))
            .await
            .unwrap();

        // 모든 이벤트는 alert 스테이지로 전달됨
        let forwarded =
            tokio::time::timeout(std::time::Duration::from_millis(500), forward_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert!(forwarded.event.id.starts_with("evt-"));

        // 같은 origin의 두 번째 이벤트에서 temporal 결과 발생
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(500), result_rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(result.result.rule_id, "temporal-default");

        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_double_start_fails() {
        let (mut pipeline, _event_tx, _result_rx, _forward_rx) = build_stage();
        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());
        pipeline.stop().await.unwrap();
        assert!(pipeline.stop().await.is_err());
    }

    #[tokio::test]
    async fn health_reflects_state() {
        let (mut pipeline, _event_tx, _result_rx, _forward_rx) = build_stage();
        assert!(pipeline.health_check().await.is_unhealthy());
        pipeline.start().await.unwrap();
        assert!(pipeline.health_check().await.is_healthy());
        pipeline.stop().await.unwrap();
        assert!(pipeline.health_check().await.is_unhealthy());
    }
}
