#![no_main]

use libfuzzer_sys::fuzz_target;

use chanprobe_core::config::ChanprobeConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = ChanprobeConfig::parse(text) {
        // 검증은 에러를 반환할 수는 있어도 패닉하면 안 됨
        let _ = config.validate();
        let _ = config.matrix.subscription_versions();
        let _ = config.delivery.backoff_kind();
    }
});
