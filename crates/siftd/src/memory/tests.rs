//! Unit tests for memory accounting.

use std::fs;

use rstest::rstest;
use tempfile::TempDir;

use super::*;

struct Counters {
    _dir: TempDir,
    settings: MemorySettings,
}

fn counters(max: &str, current: &str, stat: &str) -> Counters {
    let dir = tempfile::tempdir().expect("tempdir");
    let max_path = dir.path().join("memory.max");
    let cur_path = dir.path().join("memory.current");
    let stat_path = dir.path().join("memory.stat");
    fs::write(&max_path, max).expect("write max");
    fs::write(&cur_path, current).expect("write current");
    fs::write(&stat_path, stat).expect("write stat");
    let settings = MemorySettings {
        max_mem_file_path: max_path,
        cur_mem_file_path: cur_path,
        cur_mem_summary_file_path: stat_path,
        ..MemorySettings::default()
    };
    Counters {
        _dir: dir,
        settings,
    }
}

const STAT: &str = "anon 40\nfile 20\ninactive_file 10\nactive_file 10\n";

#[rstest]
#[case::unlimited("max\n")]
#[case::malformed("lots")]
#[case::empty("")]
fn unusable_ceiling_disables_tracking(#[case] max: &str) {
    let counters = counters(max, "10", STAT);
    assert!(MemoryProbe::setup(&counters.settings).is_none());
}

#[test]
fn missing_ceiling_disables_tracking() {
    let counters = counters("100", "10", STAT);
    let settings = MemorySettings {
        max_mem_file_path: counters.settings.max_mem_file_path.with_extension("absent"),
        ..counters.settings.clone()
    };
    assert!(MemoryProbe::setup(&settings).is_none());
}

#[test]
fn disabled_settings_never_read_counters() {
    assert!(MemoryProbe::setup(&MemorySettings::disabled()).is_none());
}

#[rstest]
#[case::refined_still_over("100", 90, "90.0")]
fn usage_over_force_exit_after_refinement_is_oom(
    #[case] current: &str,
    #[case] usage: u64,
    #[case] percent: &str,
) {
    let counters = counters("100\n", current, STAT);
    let probe = MemoryProbe::setup(&counters.settings).expect("tracking");
    let verdict = probe.sample().expect("sample");
    let MemoryVerdict::OutOfMemory(sample) = verdict else {
        panic!("expected out of memory, got {verdict:?}");
    };
    assert_eq!(sample.usage, usage);
    assert_eq!(sample.limit, 100);
    assert_eq!(format!("{:.1}", sample.percent()), percent);
}

#[rstest]
#[case::refined_below_force("95", 85)]
#[case::below_force_unrefined("85", 85)]
fn usage_between_fractions_is_a_warning(#[case] current: &str, #[case] usage: u64) {
    let counters = counters("100", current, STAT);
    let probe = MemoryProbe::setup(&counters.settings).expect("tracking");
    let verdict = probe.sample().expect("sample");
    assert_eq!(verdict, MemoryVerdict::Warning(MemorySample { usage, limit: 100 }));
    assert_eq!(format!("{:.1}", verdict.sample().percent()), "85.0");
}

#[test]
fn low_usage_is_healthy() {
    let counters = counters("100", "12", STAT);
    let probe = MemoryProbe::setup(&counters.settings).expect("tracking");
    assert!(matches!(probe.sample(), Ok(MemoryVerdict::Healthy(_))));
}

#[test]
fn missing_inactive_entry_counts_as_zero() {
    let counters = counters("100", "95", "anon 95\n");
    let probe = MemoryProbe::setup(&counters.settings).expect("tracking");
    assert!(matches!(probe.sample(), Ok(MemoryVerdict::OutOfMemory(_))));
}

#[test]
fn malformed_usage_is_an_error() {
    let counters = counters("100", "n/a", STAT);
    let probe = MemoryProbe::setup(&counters.settings).expect("tracking");
    assert!(matches!(probe.sample(), Err(MemoryError::Parse { .. })));
}
