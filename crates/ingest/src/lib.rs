//! Gridwatch 스트림 수집 크레이트
//!
//! # 모듈 구성
//!
//! - [`record`]: 명명된 입력 채널과 디코딩 결과의 닫힌 합 타입
//! - [`decoder`]: 채널별 JSON 디코딩
//! - [`ingestor`]: 수신/디코딩/디스패치 루프
//! - [`pipeline`]: 스테이지 생명주기 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! upstream log -> RawRecord -> RecordDecoder -> ChannelRecord
//!                                  |- Event       -> correlation + raw stream topic
//!                                  |- ThreatIntel -> alert index + intel topic
//!                                  `- others      -> distribution topics
//! ```

pub mod decoder;
pub mod error;
pub mod ingestor;
pub mod pipeline;
pub mod record;

// --- 주요 타입 re-export ---

pub use decoder::RecordDecoder;
pub use error::IngestError;
pub use ingestor::{IngestCounters, Ingestor};
pub use pipeline::{IngestPipeline, IngestPipelineBuilder};
pub use record::{ChannelRecord, InputChannel, RawRecord};
