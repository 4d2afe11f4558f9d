use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rerun-if-env-changed=PSTREAM_VERSION");

    let fallback = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    // An explicit override wins (release pipelines set it from the tag)
    if let Ok(version) = std::env::var("PSTREAM_VERSION") {
        let version = version.strip_prefix('v').unwrap_or(&version).to_string();
        println!("cargo:rustc-env=PSTREAM_VERSION={}", version);
        return;
    }

    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .output();

    let version = match output {
        Ok(o) if o.status.success() => {
            let git_output = String::from_utf8(o.stdout)
                .unwrap_or_default()
                .trim()
                .to_string();

            // Strip 'v' prefix if present (e.g., "v1.0.0" -> "1.0.0")
            let version = git_output.strip_prefix('v').unwrap_or(&git_output);

            // Only plain dotted numbers are usable for update comparison
            if !version.is_empty()
                && version
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
            {
                version.to_string()
            } else {
                fallback
            }
        }
        // Not on a tag, or git unavailable: use the manifest version
        _ => fallback,
    };

    println!("cargo:rustc-env=PSTREAM_VERSION={}", version);
}
