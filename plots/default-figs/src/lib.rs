//! Pulls every figure crate into the binary so their `typetag` registrations
//! are linked before the config is deserialized.

pub fn init_figs() {
    serde_json::to_string(&cilksort_getput::CilksortGetput::default()).unwrap();
    serde_json::to_string(&exafmm_sbsize::ExafmmSbsize::default()).unwrap();
    serde_json::to_string(&exafmm_weak::ExafmmWeak::default()).unwrap();
    serde_json::to_string(&uts_perf::UtsPerf::default()).unwrap();
}
