use super::super::args::ValidateArgs;
use super::super::helpers::load_config;
use crate::exit_codes::{self, EXIT_CONTRACT, EXIT_SUCCESS};
use anyhow::Context;
use dsarc_archive::archive::ManifestInfo;
use dsarc_archive::codec::read_manifest;

/// Validation failures are reported and turned into an exit code rather
/// than propagated.
pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.config.as_deref())?;
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let (name, entries) = if looks_like_xml(&bytes) {
        match read_manifest(&bytes) {
            Ok(manifest) => (manifest.name().to_string(), manifest.entry_count()),
            Err(err) => {
                eprintln!("error: {}: {err}", args.input.display());
                return Ok(EXIT_CONTRACT);
            }
        }
    } else {
        match ManifestInfo::peek_with_limits(&bytes, &config.limits()) {
            Ok(info) => {
                for path in &info.missing_payloads {
                    eprintln!("warning: declared entry has no payload: {path}");
                }
                (info.manifest.name().to_string(), info.manifest.entry_count())
            }
            Err(err) => {
                eprintln!("error: {}: [{}] {err}", args.input.display(), err.code());
                return Ok(exit_codes::for_archive_error(&err));
            }
        }
    };

    eprintln!(
        "validate: OK ({}: data service '{name}', {entries} entries)",
        args.input.display()
    );
    Ok(EXIT_SUCCESS)
}

fn looks_like_xml(bytes: &[u8]) -> bool {
    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    text.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}
