//! 알림 처리 에러 타입

use gridwatch_core::error::{GridwatchError, PipelineError};

/// 알림 처리 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// 억제 규칙 파일 로딩 실패
    #[error("suppression rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 억제 규칙 유효성 검증 실패
    #[error("suppression rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 억제 경로 평가 실패 — 보수적으로 "억제 안 함"으로 처리됩니다
    #[error("suppression evaluation error: {0}")]
    Suppression(String),

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

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AlertError> for GridwatchError {
    fn from(err: AlertError) -> Self {
        GridwatchError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
