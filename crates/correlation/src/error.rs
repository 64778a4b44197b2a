//! 상관 분석 엔진 에러 타입

use gridwatch_core::error::{GridwatchError, PipelineError};

/// 상관 분석 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 규칙 평가 중 에러
    #[error("rule evaluation error: rule '{rule_id}': {reason}")]
    Evaluation {
        /// 평가 중이던 규칙 ID
        rule_id: String,
        /// 에러 사유
        reason: String,
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

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CorrelationError> for GridwatchError {
    fn from(err: CorrelationError) -> Self {
        GridwatchError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_load_error_display() {
        let err = CorrelationError::RuleLoad {
            path: "/etc/gridwatch/rules/temporal.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        };
        assert!(err.to_string().contains("temporal.yml"));
    }

    #[test]
    fn evaluation_error_display() {
        let err = CorrelationError::Evaluation {
            rule_id: "chain-default".to_owned(),
            reason: "empty kill chain".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chain-default"));
        assert!(msg.contains("empty kill chain"));
    }

    #[test]
    fn converts_to_gridwatch_error() {
        let err = CorrelationError::Channel("closed".to_owned());
        let core_err: GridwatchError = err.into();
        assert!(matches!(core_err, GridwatchError::Pipeline(_)));
    }
}
