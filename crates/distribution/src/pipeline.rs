//! 배포 스테이지 오케스트레이션 — Pipeline trait 구현
//!
//! 업스트림 스테이지의 출력 채널(디코딩 레코드, 알림, 상위 보고,
//! 상관 결과)을 소비하여 [`Distributor`]로 발행합니다. 케이스/플레이북
//! 레코드는 토픽 규칙에 따라 두 토픽으로 갈라질 수 있습니다
//! (배정 토픽, 승인 요청 토픽).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gridwatch_core::error::GridwatchError;
use gridwatch_core::event::{AlertEvent, CorrelationEvent, EscalationEvent};
use gridwatch_core::pipeline::{HealthStatus, Pipeline};
use gridwatch_core::types::PlaybookStepStatus;
use gridwatch_ingest::record::ChannelRecord;

use crate::error::DistributionError;
use crate::registry::Distributor;
use crate::topic::{EscalationNotice, OutboundItem};

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

/// 배포 스테이지 입력 채널 묶음
struct StageChannels {
    record_rx: mpsc::Receiver<ChannelRecord>,
    alert_rx: mpsc::Receiver<AlertEvent>,
    escalation_rx: mpsc::Receiver<EscalationEvent>,
    correlation_rx: mpsc::Receiver<CorrelationEvent>,
}

/// 배포 스테이지
pub struct DistributionPipeline {
    state: StageState,
    /// 공유 배포기
    distributor: Arc<Distributor>,
    /// 채널 묶음 (start 시 태스크로 이동)
    channels: Option<StageChannels>,
    /// 취소 토큰
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DistributionPipeline {
    /// 공유 배포기에 대한 참조를 반환합니다.
    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Stopped => "stopped",
        }
    }

    /// 발행 루프 — 네 입력 채널을 select로 소비합니다.
    async fn run(
        distributor: Arc<Distributor>,
        mut channels: StageChannels,
        cancel: CancellationToken,
    ) {
        tracing::info!("distribution stage loop started");

        loop {
            tokio::select! {
                record = channels.record_rx.recv() => {
                    let Some(record) = record else { break };
                    Self::publish_record(&distributor, record);
                }
                alert = channels.alert_rx.recv() => {
                    let Some(alert_event) = alert else { break };
                    distributor.publish(&OutboundItem::Alert(alert_event.alert));
                }
                escalation = channels.escalation_rx.recv() => {
                    let Some(escalation) = escalation else { break };
                    distributor.publish(&OutboundItem::Escalation(EscalationNotice {
                        alert_id: escalation.alert_id,
                        reason: escalation.reason,
                        notified_at: escalation.metadata.timestamp,
                    }));
                }
                correlation = channels.correlation_rx.recv() => {
                    let Some(correlation_event) = correlation else { break };
                    distributor.publish(&OutboundItem::Correlation(correlation_event.result));
                }
                _ = cancel.cancelled() => {
                    tracing::info!("distribution stage received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("distribution stage loop stopped");
    }

    /// 디코딩된 레코드를 토픽 아이템으로 변환하여 발행합니다.
    ///
    /// 케이스 레코드는 담당자가 있으면 배정 토픽에도, 플레이북
    /// 레코드는 승인 대기 단계이면 승인 요청 토픽에도 발행됩니다.
    fn publish_record(distributor: &Distributor, record: ChannelRecord) {
        match record {
            ChannelRecord::Event(event) => {
                distributor.publish(&OutboundItem::Event(event));
            }
            ChannelRecord::ThreatIntel(intel) => {
                distributor.publish(&OutboundItem::ThreatIntel(intel));
            }
            ChannelRecord::AttackPattern(pattern) => {
                distributor.publish(&OutboundItem::AttackPattern(pattern));
            }
            ChannelRecord::Ioc(ioc) => {
                distributor.publish(&OutboundItem::Ioc(ioc));
            }
            ChannelRecord::Case(case) => {
                if case.assignee.is_some() {
                    distributor.publish(&OutboundItem::Assignment(case.clone()));
                }
                distributor.publish(&OutboundItem::Case(case));
            }
            ChannelRecord::Playbook(playbook) => {
                if playbook.step_status == PlaybookStepStatus::AwaitingApproval {
                    distributor.publish(&OutboundItem::ApprovalRequest(playbook.clone()));
                }
                distributor.publish(&OutboundItem::PlaybookExecution(playbook));
            }
        }
    }
}

impl Pipeline for DistributionPipeline {
    async fn start(&mut self) -> Result<(), GridwatchError> {
        if self.state == StageState::Running {
            return Err(gridwatch_core::error::PipelineError::AlreadyRunning.into());
        }

        let channels = self.channels.take().ok_or_else(|| {
            GridwatchError::Pipeline(gridwatch_core::error::PipelineError::InitFailed(
                "distribution stage channels already consumed".to_owned(),
            ))
        })?;

        tracing::info!("starting distribution stage");
        self.task = Some(tokio::spawn(Self::run(
            Arc::clone(&self.distributor),
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

        tracing::info!("stopping distribution stage");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = StageState::Stopped;
        tracing::info!("distribution stage stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            StageState::Running => HealthStatus::Healthy,
            StageState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            StageState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 배포 스테이지 빌더
pub struct DistributionPipelineBuilder {
    distributor: Option<Arc<Distributor>>,
    record_rx: Option<mpsc::Receiver<ChannelRecord>>,
    alert_rx: Option<mpsc::Receiver<AlertEvent>>,
    escalation_rx: Option<mpsc::Receiver<EscalationEvent>>,
    correlation_rx: Option<mpsc::Receiver<CorrelationEvent>>,
}

impl DistributionPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            distributor: None,
            record_rx: None,
            alert_rx: None,
            escalation_rx: None,
            correlation_rx: None,
        }
    }

    /// 배포기를 설정합니다.
    pub fn distributor(mut self, distributor: Arc<Distributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// 디코딩 레코드 수신 채널을 설정합니다 (ingest -> distribution).
    pub fn record_receiver(mut self, rx: mpsc::Receiver<ChannelRecord>) -> Self {
        self.record_rx = Some(rx);
        self
    }

    /// 알림 수신 채널을 설정합니다 (alert -> distribution).
    pub fn alert_receiver(mut self, rx: mpsc::Receiver<AlertEvent>) -> Self {
        self.alert_rx = Some(rx);
        self
    }

    /// 상위 보고 수신 채널을 설정합니다 (alert -> distribution).
    pub fn escalation_receiver(mut self, rx: mpsc::Receiver<EscalationEvent>) -> Self {
        self.escalation_rx = Some(rx);
        self
    }

    /// 상관 결과 수신 채널을 설정합니다 (alert -> distribution).
    pub fn correlation_receiver(mut self, rx: mpsc::Receiver<CorrelationEvent>) -> Self {
        self.correlation_rx = Some(rx);
        self
    }

    /// 스테이지를 빌드합니다.
    pub fn build(self) -> Result<DistributionPipeline, DistributionError> {
        let missing = |field: &str| DistributionError::Config {
            field: field.to_owned(),
            reason: "required".to_owned(),
        };

        let distributor = self.distributor.ok_or_else(|| missing("distributor"))?;
        let channels = StageChannels {
            record_rx: self.record_rx.ok_or_else(|| missing("record_receiver"))?,
            alert_rx: self.alert_rx.ok_or_else(|| missing("alert_receiver"))?,
            escalation_rx: self
                .escalation_rx
                .ok_or_else(|| missing("escalation_receiver"))?,
            correlation_rx: self
                .correlation_rx
                .ok_or_else(|| missing("correlation_receiver"))?,
        };

        Ok(DistributionPipeline {
            state: StageState::Initialized,
            distributor,
            channels: Some(channels),
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl Default for DistributionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
