//! 상관 분석 키 -- 이벤트를 규칙 버퍼로 묶는 그룹 키
//!
//! 하나의 이벤트는 최대 세 개의 키 공간에 속합니다:
//! - origin: temporal/chain 규칙용 (벤더 + 주소, 주소가 없으면 행위자/제품)
//! - address: spatial 규칙용 (/24 서브넷 또는 개략적 위치)
//! - actor: behavioral 규칙용 (행위자 계정)

use std::fmt;
use std::net::IpAddr;

use gridwatch_core::types::SecurityEvent;

/// 상관 분석 그룹 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// 발생 주체 키 (temporal/chain 키 공간)
    Origin {
        /// 센서 벤더
        vendor: String,
        /// 주소 문자열, 없으면 행위자 또는 제품명
        scope: String,
    },
    /// 네트워크 위치 키 (spatial 키 공간)
    Address(String),
    /// 행위자 키 (behavioral 키 공간)
    Actor(String),
}

impl CorrelationKey {
    /// 이벤트의 origin 키를 유도합니다.
    ///
    /// 주소 > 행위자 > 제품명 순으로 스코프를 결정하므로 항상 존재합니다.
    pub fn origin_of(event: &SecurityEvent) -> Self {
        let scope = match (&event.origin.source_address, &event.origin.actor) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(actor)) => actor.clone(),
            (None, None) => event.origin.product.clone(),
        };
        Self::Origin {
            vendor: event.origin.vendor.clone(),
            scope,
        }
    }

    /// 이벤트의 spatial 키를 유도합니다.
    ///
    /// 주소가 있으면 /24 서브넷(IPv4) 또는 주소 그대로(IPv6),
    /// 주소가 없고 위치가 있으면 위치 식별자를 사용합니다.
    /// 둘 다 없으면 None입니다.
    pub fn spatial_of(event: &SecurityEvent) -> Option<Self> {
        if let Some(addr) = event.origin.source_address {
            return Some(Self::Address(subnet_of(addr)));
        }
        event
            .origin
            .location
            .as_ref()
            .map(|loc| Self::Address(format!("loc:{loc}")))
    }

    /// 이벤트의 actor 키를 유도합니다. 행위자가 없으면 None입니다.
    pub fn actor_of(event: &SecurityEvent) -> Option<Self> {
        event
            .origin
            .actor
            .as_ref()
            .map(|actor| Self::Actor(actor.clone()))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Origin { vendor, scope } => write!(f, "origin:{vendor}:{scope}"),
            Self::Address(net) => write!(f, "address:{net}"),
            Self::Actor(actor) => write!(f, "actor:{actor}"),
        }
    }
}

/// 주소의 개략적 네트워크 식별자를 반환합니다.
///
/// IPv4는 /24 서브넷, IPv6는 주소 그대로 사용합니다.
fn subnet_of(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2])
        }
        IpAddr::V6(v6) => v6.to_string(),
    }
}
