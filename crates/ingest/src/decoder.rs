//! 레코드 디코더 — 채널별 JSON 페이로드를 타입 레코드로 변환합니다.
//!
//! 채널 이름이 타입 판별자이므로 각 채널은 정확히 하나의 대상 타입으로
//! 디코딩됩니다. 디코딩 실패는 해당 레코드 하나만 드롭하며 채널을
//! 중단시키지 않습니다 (호출 측에서 로깅 후 계속 진행).

use crate::error::IngestError;
use crate::record::{ChannelRecord, InputChannel, RawRecord};

/// 레코드 디코더
///
/// 페이로드 크기 상한을 적용한 뒤 채널별 serde 디코딩을 수행합니다.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    /// 페이로드 최대 크기 (바이트)
    max_payload_bytes: usize,
}

impl RecordDecoder {
    /// 새 디코더를 생성합니다.
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// 원시 레코드를 타입 레코드로 디코딩합니다.
    ///
    /// # Errors
    /// - 채널 이름을 해석할 수 없는 경우
    /// - 페이로드가 크기 상한을 초과하는 경우
    /// - JSON 디코딩이 실패하는 경우
    pub fn decode(&self, raw: &RawRecord) -> Result<ChannelRecord, IngestError> {
        let channel = InputChannel::from_name(&raw.channel)
            .ok_or_else(|| IngestError::UnknownChannel(raw.channel.clone()))?;

        if raw.payload.len() > self.max_payload_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: raw.payload.len(),
                max: self.max_payload_bytes,
            });
        }

        let decode_err = |e: serde_json::Error| IngestError::Decode {
            channel: raw.channel.clone(),
            reason: e.to_string(),
        };

        // 채널별 완전 매칭 — 새 채널 추가 시 컴파일러가 누락을 잡습니다.
        let record = match channel {
            InputChannel::SecurityEvents => {
                ChannelRecord::Event(serde_json::from_slice(&raw.payload).map_err(decode_err)?)
            }
            InputChannel::ThreatIntelligence => ChannelRecord::ThreatIntel(
                serde_json::from_slice(&raw.payload).map_err(decode_err)?,
            ),
            InputChannel::AttackPatterns => ChannelRecord::AttackPattern(
                serde_json::from_slice(&raw.payload).map_err(decode_err)?,
            ),
            InputChannel::IocUpdates => {
                ChannelRecord::Ioc(serde_json::from_slice(&raw.payload).map_err(decode_err)?)
            }
            InputChannel::CaseUpdates => {
                ChannelRecord::Case(serde_json::from_slice(&raw.payload).map_err(decode_err)?)
            }
            InputChannel::PlaybookExecutions => {
                ChannelRecord::Playbook(serde_json::from_slice(&raw.payload).map_err(decode_err)?)
            }
        };

        Ok(record)
    }
}
