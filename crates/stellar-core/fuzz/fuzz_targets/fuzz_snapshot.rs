#![no_main]
use libfuzzer_sys::fuzz_target;
use stellar_core::serialize;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected with an error, never a panic.
    let _ = serialize::restore(data);
});
