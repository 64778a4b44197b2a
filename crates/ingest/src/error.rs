//! 스트림 수집 에러 타입
//!
//! [`IngestError`]는 수집 스테이지 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<IngestError> for GridwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use gridwatch_core::error::{GridwatchError, PipelineError};

/// 스트림 수집 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 알 수 없는 채널 이름
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// 페이로드 디코딩 실패
    #[error("decode error on channel '{channel}': {reason}")]
    Decode {
        /// 수신 채널
        channel: String,
        /// 실패 사유
        reason: String,
    },

    /// 페이로드 크기 초과
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge {
        /// 수신 페이로드 크기
        size: usize,
        /// 허용 최대 크기
        max: usize,
    },

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

impl From<IngestError> for GridwatchError {
    fn from(err: IngestError) -> Self {
        GridwatchError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
