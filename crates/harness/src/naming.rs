//! 시나리오 리소스 이름 생성
//!
//! 이름은 시나리오 식별자(테스트 이름, 인코딩, 구독 리비전, 채널, API 버전 정책)의
//! 순수 함수입니다. 같은 네임스페이스에서 동시에 실행되는 시나리오끼리 이름이
//! 충돌하지 않도록 식별자 전체에 대한 UUID v5 해시 8자리를 접미어로 붙입니다.
//!
//! 형식: `<test>-<role>-<encoding>-<version>-<kind>-<hash8>` (최대 63자, DNS-1123 label)

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chanprobe_core::event::Encoding;
use chanprobe_core::types::{ApiVersionPolicy, ChannelDescriptor, SubscriptionVersion};

/// 리소스 이름 최대 길이 (DNS-1123 label)
pub const MAX_NAME_LEN: usize = 63;

/// 해시 접미어 길이
const HASH_LEN: usize = 8;

/// 채널 역할
pub const ROLE_CHANNEL: &str = "channel";
/// 구독자(이벤트 로거) 역할
pub const ROLE_SUBSCRIBER: &str = "logger";
/// 구독 역할
pub const ROLE_SUBSCRIPTION: &str = "subscription";
/// 발신자 역할
pub const ROLE_SENDER: &str = "sender";

/// 한 시나리오가 사용하는 리소스 이름 묶음
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioNames {
    /// 채널 이름
    pub channel: String,
    /// 구독자 이름
    pub subscriber: String,
    /// 구독 이름
    pub subscription: String,
    /// 이벤트 발신자 식별자
    pub sender: String,
}

impl ScenarioNames {
    /// 시나리오 식별자에서 이름을 결정적으로 생성합니다.
    pub fn derive(
        test_name: &str,
        encoding: Encoding,
        version: SubscriptionVersion,
        channel: &ChannelDescriptor,
        api_version: &ApiVersionPolicy,
    ) -> Self {
        let hash = identity_hash(test_name, encoding, version, channel, api_version);
        let name = |role: &str| {
            build_name(
                &format!("{test_name}-{role}-{encoding}-{version}-{}", channel.kind),
                &hash,
            )
        };

        Self {
            channel: name(ROLE_CHANNEL),
            subscriber: name(ROLE_SUBSCRIBER),
            subscription: name(ROLE_SUBSCRIPTION),
            sender: name(ROLE_SENDER),
        }
    }

    /// 모든 이름을 반환합니다.
    pub fn all(&self) -> [&str; 4] {
        [
            &self.channel,
            &self.subscriber,
            &self.subscription,
            &self.sender,
        ]
    }
}

impl fmt::Display for ScenarioNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel={} subscriber={} subscription={}",
            self.channel, self.subscriber, self.subscription
        )
    }
}

fn identity_hash(
    test_name: &str,
    encoding: Encoding,
    version: SubscriptionVersion,
    channel: &ChannelDescriptor,
    api_version: &ApiVersionPolicy,
) -> String {
    // 구분자로 NUL을 사용하여 필드 경계가 섞이지 않게 합니다.
    let identity = format!(
        "{test_name}\0{encoding}\0{version}\0{}\0{}\0{api_version}",
        channel.kind, channel.api_version
    );
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, identity.as_bytes());
    let mut hex = uuid.simple().to_string();
    hex.truncate(HASH_LEN);
    hex
}

fn build_name(stem: &str, hash: &str) -> String {
    let mut stem = sanitize(stem);
    let budget = MAX_NAME_LEN - HASH_LEN - 1;
    if stem.len() > budget {
        // sanitize 결과는 ASCII이므로 바이트 단위로 잘라도 안전합니다.
        stem.truncate(budget);
        while stem.ends_with('-') {
            stem.pop();
        }
    }

    if stem.is_empty() {
        hash.to_owned()
    } else {
        format!("{stem}-{hash}")
    }
}

/// DNS-1123 label 문자로 정규화합니다.
///
/// 소문자로 바꾸고, 허용되지 않는 문자는 `-`로 치환하며,
/// 연속된 `-`는 하나로 합치고 양 끝의 `-`는 제거합니다.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// 이름이 DNS-1123 label 규칙을 만족하는지 확인합니다.
pub fn is_dns1123_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}
