//! 이벤트: 시나리오마다 발행하는 단일 이벤트
//!
//! [`EventEnvelope`]는 생성 후 변경되지 않으며, 시나리오 간 오탐을 막기 위해
//! 실행마다 고유한 payload를 가집니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// payload 접두어
pub const PAYLOAD_PREFIX: &str = "TestSingleEvent";

/// 테스트 이벤트의 타입 속성
pub const EVENT_TYPE_TEST: &str = "dev.chanprobe.test.single";

/// 이벤트 전송 인코딩 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// 속성을 헤더로, data를 본문으로 전송
    #[default]
    Binary,
    /// 속성과 data를 하나의 JSON 본문으로 전송
    Structured,
}

impl Encoding {
    /// 인코딩 토큰 문자열 (리소스 이름에도 사용)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Structured => "structured",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "structured" => Ok(Self::Structured),
            other => Err(format!(
                "unknown encoding '{other}' (expected: binary, structured)"
            )),
        }
    }
}

/// 채널에 발행할 이벤트 하나
///
/// 필드는 생성 후 변경할 수 없도록 비공개이며 접근자만 제공합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    id: String,
    payload: String,
    origin: String,
    encoding: Encoding,
    data: String,
}

impl EventEnvelope {
    /// 새 고유 payload를 가진 단일 이벤트를 생성합니다.
    ///
    /// payload는 `TestSingleEvent-<uuid v4>`, data는 `{"msg":"<payload>"}` 입니다.
    pub fn single_event(origin: impl Into<String>, encoding: Encoding) -> Self {
        let payload = format!("{PAYLOAD_PREFIX}-{}", uuid::Uuid::new_v4());
        Self::with_payload(payload, origin, encoding)
    }

    /// 지정한 payload로 이벤트를 생성합니다.
    pub fn with_payload(
        payload: impl Into<String>,
        origin: impl Into<String>,
        encoding: Encoding,
    ) -> Self {
        let payload = payload.into();
        let data = serde_json::json!({ "msg": payload }).to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            origin: origin.into(),
            encoding,
            data,
        }
    }

    /// 이벤트 ID (UUID v4)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 구독자 출력에서 찾을 고유 payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// 발신자 식별자
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 전송 인코딩
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// 이벤트 data (JSON)
    pub fn data(&self) -> &str {
        &self.data
    }

    /// 이벤트 타입 속성
    pub fn event_type(&self) -> &'static str {
        EVENT_TYPE_TEST
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event[{}] origin={} encoding={} payload={}",
            self.id, self.origin, self.encoding, self.payload
        )
    }
}
