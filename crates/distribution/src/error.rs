//! 배포 레이어 에러 타입

use gridwatch_core::error::{GridwatchError, PipelineError};

/// 배포 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<DistributionError> for GridwatchError {
    fn from(err: DistributionError) -> Self {
        GridwatchError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
