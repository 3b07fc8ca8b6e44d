#![no_main]

use libfuzzer_sys::fuzz_target;
use mw_io::{read_series_csv_str, write_jsonl_string};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let input = format!("obs_time,value,internal_series_code\n{text}");
    if let Ok(series) = read_series_csv_str(&input, "A") {
        assert!(series.is_sorted_by_time());
        let jsonl = write_jsonl_string(&series).expect("finite-or-null rows always serialize");
        assert_eq!(jsonl.lines().count(), series.len());
    }
});
