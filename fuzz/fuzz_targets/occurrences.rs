#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use chanprobe_harness::verifier::{count_occurrences, tail_snippet};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    output: String,
    expected: String,
}

fuzz_target!(|input: FuzzInput| {
    let count = count_occurrences(&input.output, &input.expected);
    if input.expected.is_empty() {
        assert_eq!(count, 0);
    } else {
        assert!(count * input.expected.len() <= input.output.len());
    }
    let _ = tail_snippet(&input.output);
});
