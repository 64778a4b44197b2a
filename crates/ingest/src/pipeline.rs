//! 수집 스테이지 오케스트레이션 — Pipeline trait 구현
//!
//! [`IngestPipeline`]은 core의 [`Pipeline`](gridwatch_core::pipeline::Pipeline)
//! trait을 구현하여 `gridwatch-daemon`에서 다른 스테이지와 동일한
//! 생명주기로 관리됩니다.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gridwatch_core::config::IngestConfig;
use gridwatch_core::error::GridwatchError;
use gridwatch_core::event::StreamEvent;
use gridwatch_core::pipeline::{HealthStatus, Pipeline};
use gridwatch_core::types::ThreatIntelRecord;

use crate::decoder::RecordDecoder;
use crate::error::IngestError;
use crate::ingestor::{IngestCounters, Ingestor};
use crate::record::{ChannelRecord, RawRecord};

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

/// 수집 스테이지
///
/// 수집 루프를 백그라운드 태스크로 실행하고 생명주기를 관리합니다.
pub struct IngestPipeline {
    state: StageState,
    /// 수집기 (start 시 태스크로 이동)
    ingestor: Option<Ingestor>,
    /// 공유 카운터
    counters: Arc<IngestCounters>,
    /// 백그라운드 태스크 취소 토큰
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들
    task: Option<tokio::task::JoinHandle<Result<mpsc::Receiver<RawRecord>, IngestError>>>,
}

impl IngestPipeline {
    /// 수신한 레코드 수를 반환합니다.
    pub fn received_count(&self) -> u64 {
        self.counters.received.load(Ordering::Relaxed)
    }

    /// 디코딩 실패 수를 반환합니다.
    pub fn decode_error_count(&self) -> u64 {
        self.counters.decode_errors.load(Ordering::Relaxed)
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Stopped => "stopped",
        }
    }
}

impl Pipeline for IngestPipeline {
    async fn start(&mut self) -> Result<(), GridwatchError> {
        if self.state == StageState::Running {
            return Err(gridwatch_core::error::PipelineError::AlreadyRunning.into());
        }

        let ingestor = self.ingestor.take().ok_or_else(|| {
            GridwatchError::Pipeline(gridwatch_core::error::PipelineError::InitFailed(
                "ingestor already consumed".to_owned(),
            ))
        })?;

        tracing::info!("starting ingest stage");
        self.task = Some(tokio::spawn(ingestor.run(self.cancel.clone())));
        self.state = StageState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GridwatchError> {
        if self.state != StageState::Running {
            return Err(gridwatch_core::error::PipelineError::NotRunning.into());
        }

        tracing::info!("stopping ingest stage");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(raw_rx)) => {
                    // 재시작 지원을 위해 수신 채널을 보존하지 않고 종료합니다.
                    drop(raw_rx);
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "ingestor exited with error"),
                Err(e) => tracing::warn!(error = %e, "ingestor task join failed"),
            }
        }
        self.state = StageState::Stopped;
        tracing::info!("ingest stage stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            StageState::Running => {
                let received = self.received_count();
                let errors = self.decode_error_count();
                // 유입의 절반 이상이 깨진 레코드이면 업스트림 이상 신호
                if received >= 100 && errors * 2 > received {
                    HealthStatus::Degraded(format!(
                        "decode failures high: {errors}/{received}"
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

/// 수집 스테이지 빌더
///
/// 스테이지를 구성하고 필요한 채널을 생성합니다.
pub struct IngestPipelineBuilder {
    config: IngestConfig,
    event_tx: Option<mpsc::Sender<StreamEvent>>,
    intel_tx: Option<mpsc::Sender<ThreatIntelRecord>>,
    publish_tx: Option<mpsc::Sender<ChannelRecord>>,
}

impl IngestPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            event_tx: None,
            intel_tx: None,
            publish_tx: None,
        }
    }

    /// 수집 설정을 지정합니다.
    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// 보안 이벤트 전송 채널을 설정합니다 (-> correlation).
    pub fn event_sender(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 위협 인텔리전스 전송 채널을 설정합니다 (-> alert).
    pub fn intel_sender(mut self, tx: mpsc::Sender<ThreatIntelRecord>) -> Self {
        self.intel_tx = Some(tx);
        self
    }

    /// 디코딩 레코드 전송 채널을 설정합니다 (-> distribution).
    pub fn publish_sender(mut self, tx: mpsc::Sender<ChannelRecord>) -> Self {
        self.publish_tx = Some(tx);
        self
    }

    /// 스테이지를 빌드합니다.
    ///
    /// # Returns
    /// - `IngestPipeline`: 스테이지 인스턴스
    /// - `mpsc::Sender<RawRecord>`: 업스트림 프로듀서가 사용할 원시 레코드 송신 핸들
    pub fn build(self) -> Result<(IngestPipeline, mpsc::Sender<RawRecord>), IngestError> {
        if self.config.channel_capacity == 0 {
            return Err(IngestError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let event_tx = self.event_tx.ok_or_else(|| IngestError::Config {
            field: "event_sender".to_owned(),
            reason: "event sender is required".to_owned(),
        })?;
        let intel_tx = self.intel_tx.ok_or_else(|| IngestError::Config {
            field: "intel_sender".to_owned(),
            reason: "intel sender is required".to_owned(),
        })?;
        let publish_tx = self.publish_tx.ok_or_else(|| IngestError::Config {
            field: "publish_sender".to_owned(),
            reason: "publish sender is required".to_owned(),
        })?;

        let (raw_tx, raw_rx) = mpsc::channel(self.config.channel_capacity);
        let counters = Arc::new(IngestCounters::default());
        let ingestor = Ingestor::new(
            raw_rx,
            RecordDecoder::new(self.config.max_payload_bytes),
            event_tx,
            intel_tx,
            publish_tx,
            Arc::clone(&counters),
        );

        let pipeline = IngestPipeline {
            state: StageState::Initialized,
            ingestor: Some(ingestor),
            counters,
            cancel: CancellationToken::new(),
            task: None,
        };

        Ok((pipeline, raw_tx))
    }
}

impl Default for IngestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
