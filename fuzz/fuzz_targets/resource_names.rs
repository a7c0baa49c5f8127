#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use chanprobe_core::event::Encoding;
use chanprobe_core::types::{ApiVersionPolicy, ChannelDescriptor, SubscriptionVersion};
use chanprobe_harness::naming::{is_dns1123_label, sanitize, ScenarioNames};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    test_name: String,
    kind: String,
    api_version: String,
    override_version: Option<String>,
    structured: bool,
    version: u8,
}

fuzz_target!(|input: FuzzInput| {
    let encoding = if input.structured {
        Encoding::Structured
    } else {
        Encoding::Binary
    };
    let version = SubscriptionVersion::ALL[usize::from(input.version) % SubscriptionVersion::ALL.len()];
    let channel = ChannelDescriptor::new(input.kind.as_str(), input.api_version.as_str());
    let policy = match input.override_version {
        Some(v) => ApiVersionPolicy::Override(v),
        None => ApiVersionPolicy::Native,
    };

    let names = ScenarioNames::derive(&input.test_name, encoding, version, &channel, &policy);

    // 어떤 입력이든 유효한 리소스 이름이어야 함
    for name in names.all() {
        assert!(is_dns1123_label(name), "invalid name {name:?}");
    }
    assert_eq!(
        names,
        ScenarioNames::derive(&input.test_name, encoding, version, &channel, &policy)
    );

    let sanitized = sanitize(&input.kind);
    assert_eq!(sanitize(&sanitized), sanitized);
});
