//! Architecture invariant: direct EOA submission paths exist only inside
//! the funding-mode dispatch. Multisig runs must never gain a code path
//! that bypasses the proposal pipeline.

use std::fs;
use std::path::{Path, PathBuf};

const DIRECT_SUBMIT_MARKERS: &[&str] = &[".submit_router_multicall(", ".submit_token_approve("];

/// Files allowed to invoke the direct-submit methods: the trait impl itself
/// and the two funding-mode dispatch sites.
const ALLOWED_DIRECT_SUBMIT_CALLERS: &[&str] = &[
    "src/chain/rpc.rs",
    "src/orchestrator.rs",
    "src/approval.rs",
];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

#[test]
fn direct_submission_is_limited_to_funding_dispatch() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let src_root = repo_root.join("src");
    let mut files = Vec::new();
    collect_rust_files(&src_root, &mut files);
    assert!(!files.is_empty(), "no source files found under src/");

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if !DIRECT_SUBMIT_MARKERS
                .iter()
                .any(|marker| trimmed.contains(marker))
            {
                continue;
            }
            if ALLOWED_DIRECT_SUBMIT_CALLERS
                .iter()
                .any(|allowed| *allowed == rel)
            {
                continue;
            }
            offenders.push(format!("{rel}:{} -> {trimmed}", idx + 1));
        }
    }

    assert!(
        offenders.is_empty(),
        "direct EOA submission outside the funding dispatch:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn direct_submit_dispatch_sites_are_gated_by_funding_mode() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    for file in ["src/orchestrator.rs", "src/approval.rs"] {
        let content = fs::read_to_string(repo_root.join(file)).unwrap();
        let has_direct_call = DIRECT_SUBMIT_MARKERS
            .iter()
            .any(|marker| content.contains(marker));
        if has_direct_call {
            assert!(
                content.contains("FundingMode::DirectKey"),
                "{file} calls a direct-submit method without matching on FundingMode::DirectKey"
            );
        }
    }
}
