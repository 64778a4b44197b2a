//! Gridwatch 알림 처리 크레이트
//!
//! # 모듈 구성
//!
//! - [`processor`]: 트리거 판정, 알림 키별 억제, 상위 보고 판정
//! - [`rules`]: YAML 억제 규칙 로딩 및 시그니처 컴파일
//! - [`actions`]: 키워드 기반 권장 대응 조치
//! - [`intel`]: 위협 인텔리전스 지표 인덱스
//! - [`pipeline`]: 스테이지 생명주기 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! StreamEvent / CorrelationResult -> trigger check -> suppression (per-key)
//!                                                          |
//!                                      reasoning + actions + escalation
//!                                                          |
//!                                                  Alert -> distribution
//! ```

pub mod actions;
pub mod error;
pub mod intel;
pub mod pipeline;
pub mod processor;
pub mod rules;

// --- 주요 타입 re-export ---

pub use error::AlertError;
pub use intel::ThreatIntelIndex;
pub use pipeline::{AlertPipeline, AlertPipelineBuilder};
pub use processor::{AlertKey, AlertProcessor, AlertRecord};
pub use rules::{CompiledSuppression, SuppressionLoader, SuppressionRule, SuppressionStatus};
