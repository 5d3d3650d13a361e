// Build metadata for `kpiform --version`: commit, profile, target triple.

use std::env;
use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

/// Short commit hash, suffixed `-dirty` when the work tree has changes.
/// `None` outside a git checkout (e.g. a packaged source tarball).
fn commit() -> Option<String> {
    let hash = git(&["rev-parse", "--short=7", "HEAD"])?;
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty());
    Some(if dirty { format!("{hash}-dirty") } else { hash })
}

fn main() {
    for path in ["../../.git/HEAD", "../../.git/index", "../../.git/refs/heads"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let build = [
        ("KPIFORM_COMMIT", commit().unwrap_or_else(|| "unknown".into())),
        ("KPIFORM_PROFILE", env::var("PROFILE").unwrap_or_else(|_| "unknown".into())),
        ("KPIFORM_TARGET", env::var("TARGET").unwrap_or_else(|_| "unknown".into())),
    ];
    for (key, value) in build {
        println!("cargo:rustc-env={key}={value}");
    }
}
