#![no_main]

use edge_inference::{parse_gp_artifact, GP_ARTIFACT_VERSION};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(artifact) = parse_gp_artifact(&raw) {
        assert_eq!(artifact.format_version, GP_ARTIFACT_VERSION);
        assert!(artifact
            .rows
            .iter()
            .all(|row| row.input.len() == artifact.input_dim));
        let rendered = serde_json::to_string(&artifact).expect("artifact serializes");
        let reparsed = parse_gp_artifact(&rendered).expect("rendered artifact parses");
        assert_eq!(reparsed.rows.len(), artifact.rows.len());
    }
});
