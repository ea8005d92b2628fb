//! Request validation for the privileged API.
//!
//! Everything that crosses from an HTTP request into the runtime adapter goes
//! through here first: ports, container names, commands and their arguments,
//! recipe text, and archive entries. The runtime adapter is the only component
//! that spawns external processes, so these checks are what stand between a
//! request body and a `docker` invocation.

use crate::{LudocoreError, LudocoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Maximum length of a container name (Docker's own limit).
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

/// Maximum accepted player count from a heartbeat.
pub const MAX_PLAYER_COUNT: u32 = 10_000;

/// Maximum size of an uploaded build archive.
pub const MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum number of entries in an uploaded archive.
pub const MAX_ARCHIVE_ENTRIES: usize = 10_000;

/// Maximum aggregate uncompressed-to-compressed ratio before an archive is
/// treated as a decompression bomb.
pub const MAX_COMPRESSION_RATIO: u64 = 100;

/// Maximum aggregate uncompressed size of an archive.
pub const MAX_EXTRACTED_SIZE: u64 = MAX_UPLOAD_SIZE * MAX_COMPRESSION_RATIO;

/// Maximum size of a recipe.
pub const MAX_RECIPE_SIZE: usize = 1024 * 1024;

/// Maximum length of a command override.
pub const MAX_COMMAND_LEN: usize = 256;

/// Maximum length of a single command argument.
pub const MAX_ARG_LEN: usize = 1024;

/// Maximum number of command arguments.
pub const MAX_ARGS: usize = 50;

/// Shell metacharacters rejected in commands and arguments.
const DANGEROUS_CHARS: &[char] = &[
    ';', '&', '|', '$', '`', '\\', '<', '>', '(', ')', '{', '}', '[', ']', '!', '#', '*', '?', '~',
];

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Validates an externally supplied port string. An empty string is accepted
/// and means "auto-assign"; otherwise the value must parse as a port in
/// `[1, 65535]`.
pub fn validate_port(port: &str) -> LudocoreResult<Option<u16>> {
    if port.is_empty() {
        return Ok(None);
    }

    let parsed: u32 = port
        .parse()
        .map_err(|_| LudocoreError::Validation(format!("port must be a number, got: {}", port)))?;

    if parsed == 0 || parsed > u16::MAX as u32 {
        return Err(LudocoreError::Validation(format!(
            "port must be between 1 and 65535, got: {}",
            parsed
        )));
    }

    Ok(Some(parsed as u16))
}

/// Validates a container name against Docker's naming convention: must start
/// with an alphanumeric and contain only alphanumerics, hyphens, and
/// underscores, at most 63 bytes.
pub fn validate_container_name(name: &str) -> LudocoreResult<()> {
    if name.is_empty() {
        return Err(LudocoreError::Validation(
            "container name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_CONTAINER_NAME_LEN {
        return Err(LudocoreError::Validation(format!(
            "container name must be {} characters or less, got: {}",
            MAX_CONTAINER_NAME_LEN,
            name.len()
        )));
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(LudocoreError::Validation(
            "container name must start with an alphanumeric character".to_string(),
        ));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(LudocoreError::Validation(
            "container name may contain only alphanumerics, hyphens, and underscores".to_string(),
        ));
    }

    Ok(())
}

/// Validates a heartbeat player count.
pub fn validate_player_count(count: u32) -> LudocoreResult<()> {
    if count > MAX_PLAYER_COUNT {
        return Err(LudocoreError::Validation(format!(
            "player count cannot exceed {}, got: {}",
            MAX_PLAYER_COUNT, count
        )));
    }
    Ok(())
}

/// Validates a command override. An empty command is accepted and means "use
/// the image's entrypoint". Shell metacharacters and path traversal are
/// rejected because the value ends up on a `docker run` command line.
pub fn validate_command(cmd: &str) -> LudocoreResult<()> {
    if cmd.is_empty() {
        return Ok(());
    }

    if cmd.len() > MAX_COMMAND_LEN {
        return Err(LudocoreError::Validation(format!(
            "command length {} exceeds maximum {}",
            cmd.len(),
            MAX_COMMAND_LEN
        )));
    }

    if cmd.contains(DANGEROUS_CHARS) {
        return Err(LudocoreError::Validation(
            "command contains potentially dangerous characters".to_string(),
        ));
    }

    if cmd.contains("..") {
        return Err(LudocoreError::Validation(
            "command cannot contain path traversal sequences".to_string(),
        ));
    }

    Ok(())
}

/// Validates a command argument list.
pub fn validate_args(args: &[String]) -> LudocoreResult<()> {
    if args.len() > MAX_ARGS {
        return Err(LudocoreError::Validation(format!(
            "too many arguments: {}, maximum: {}",
            args.len(),
            MAX_ARGS
        )));
    }

    for (i, arg) in args.iter().enumerate() {
        if arg.len() > MAX_ARG_LEN {
            return Err(LudocoreError::Validation(format!(
                "argument {} length {} exceeds maximum {}",
                i,
                arg.len(),
                MAX_ARG_LEN
            )));
        }

        if arg.contains(DANGEROUS_CHARS) || arg.contains("..") {
            return Err(LudocoreError::Validation(format!(
                "argument {} contains potentially dangerous characters",
                i
            )));
        }
    }

    Ok(())
}

/// Validates recipe text: non-empty after trimming, bounded in size, and
/// containing at least one non-comment line whose first token is `FROM`.
pub fn validate_recipe(content: &str) -> LudocoreResult<()> {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Err(LudocoreError::Validation(
            "recipe content cannot be empty".to_string(),
        ));
    }

    if content.len() > MAX_RECIPE_SIZE {
        return Err(LudocoreError::Validation(format!(
            "recipe size {} exceeds maximum {}",
            content.len(),
            MAX_RECIPE_SIZE
        )));
    }

    let has_from = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|tok| tok.eq_ignore_ascii_case("FROM"))
        });

    if !has_from {
        return Err(LudocoreError::Validation(
            "recipe must contain a FROM instruction".to_string(),
        ));
    }

    Ok(())
}

/// Validates a recipe preset name.
pub fn validate_preset_name(name: &str) -> LudocoreResult<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(LudocoreError::Validation(
            "preset name must be between 1 and 64 characters".to_string(),
        ));
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric()
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(LudocoreError::Validation(
            "preset name must start with an alphanumeric and contain only alphanumerics, hyphens, underscores, or dots"
                .to_string(),
        ));
    }

    Ok(())
}

/// Strips control bytes and path separators from an archive leaf filename and
/// truncates the result to 255 bytes.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|&c| c >= ' ' && c != '\u{7f}')
        .collect();

    if sanitized.len() > 255 {
        let mut cut = 255;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
    }

    sanitized
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Running bounds check over the entries of an uploaded archive. Fed one entry
/// at a time during the pre-scan; trips on entry count, aggregate uncompressed
/// size, or aggregate compression ratio.
#[derive(Debug, Default)]
pub struct ArchiveGauge {
    entries: usize,
    total_uncompressed: u64,
    total_compressed: u64,
}

impl ArchiveGauge {
    /// Creates a gauge with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts one archive entry, failing if any aggregate bound is exceeded.
    pub fn check_entry(&mut self, uncompressed: u64, compressed: u64) -> LudocoreResult<()> {
        self.entries += 1;
        self.total_uncompressed += uncompressed;
        self.total_compressed += compressed;

        if self.entries > MAX_ARCHIVE_ENTRIES {
            return Err(LudocoreError::Validation(format!(
                "archive contains more than {} entries",
                MAX_ARCHIVE_ENTRIES
            )));
        }

        if self.total_uncompressed > MAX_EXTRACTED_SIZE {
            return Err(LudocoreError::Validation(format!(
                "total extracted size {} exceeds maximum {}",
                self.total_uncompressed, MAX_EXTRACTED_SIZE
            )));
        }

        if self.total_compressed > 0 {
            let ratio = self.total_uncompressed / self.total_compressed;
            if ratio > MAX_COMPRESSION_RATIO {
                return Err(LudocoreError::Validation(format!(
                    "compression ratio {} exceeds maximum {} (potential zip bomb)",
                    ratio, MAX_COMPRESSION_RATIO
                )));
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port_bounds() {
        assert_eq!(validate_port("1").unwrap(), Some(1));
        assert_eq!(validate_port("65535").unwrap(), Some(65535));
        assert_eq!(validate_port("").unwrap(), None);

        assert!(validate_port("0").is_err());
        assert!(validate_port("65536").is_err());
        assert!(validate_port("-1").is_err());
        assert!(validate_port("sevens").is_err());
    }

    #[test]
    fn test_validate_container_name_accepts_docker_convention() {
        assert!(validate_container_name("shadow-dragon").is_ok());
        assert!(validate_container_name("a").is_ok());
        assert!(validate_container_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_validate_container_name_rejects_bad_shapes() {
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name(&"a".repeat(64)).is_err());
        assert!(validate_container_name("-leading-dash").is_err());
        assert!(validate_container_name("_leading_underscore").is_err());
        assert!(validate_container_name("has space").is_err());
        assert!(validate_container_name("semi;colon").is_err());
    }

    #[test]
    fn test_validate_command_rejects_metacharacters() {
        assert!(validate_command("").is_ok());
        assert!(validate_command("/app/server.x86_64").is_ok());

        for bad in [
            "a;b", "a&b", "a|b", "a$b", "a`b", "a(b", "a)b", "a{b", "a}b", "a[b", "a]b", "a!b",
            "a#b", "a*b", "a?b", "a~b", "a<b", "a>b", "a\\b",
        ] {
            assert!(validate_command(bad).is_err(), "expected rejection: {bad}");
        }

        assert!(validate_command("../escape").is_err());
    }

    #[test]
    fn test_validate_args_limits() {
        assert!(validate_args(&[]).is_ok());
        assert!(validate_args(&["-port".to_string(), "7777".to_string()]).is_ok());

        let too_many: Vec<String> = (0..51).map(|i| i.to_string()).collect();
        assert!(validate_args(&too_many).is_err());

        assert!(validate_args(&["a".repeat(1025)]).is_err());
        assert!(validate_args(&["rm -rf $(HOME)".to_string()]).is_err());
        assert!(validate_args(&["..".to_string()]).is_err());
    }

    #[test]
    fn test_validate_recipe_requires_base_image() {
        assert!(validate_recipe("FROM debian:13-slim\n").is_ok());
        assert!(validate_recipe("# comment\n\nfrom alpine:3\n").is_ok());

        assert!(validate_recipe("").is_err());
        assert!(validate_recipe("   \n\t").is_err());
        assert!(validate_recipe("# FROM inside a comment\nRUN true\n").is_err());
        assert!(validate_recipe("FROMAGE cheese\n").is_err());
    }

    #[test]
    fn test_validate_recipe_size_bound() {
        let big = format!("FROM alpine\n{}", "#x\n".repeat(MAX_RECIPE_SIZE / 3 + 1));
        assert!(validate_recipe(&big).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("plain.bin"), "plain.bin");
        assert_eq!(sanitize_filename("dir/with/seps"), "dir_with_seps");
        assert_eq!(sanitize_filename("back\\slash"), "back_slash");
        assert_eq!(sanitize_filename("ctrl\u{0}byte\n"), "ctrlbyte");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), 255);
    }

    #[test]
    fn test_archive_gauge_entry_count() {
        let mut gauge = ArchiveGauge::new();
        for _ in 0..MAX_ARCHIVE_ENTRIES {
            gauge.check_entry(10, 10).unwrap();
        }
        assert!(gauge.check_entry(10, 10).is_err());
    }

    #[test]
    fn test_archive_gauge_ratio() {
        let mut gauge = ArchiveGauge::new();
        // 1 KiB compressed claiming 2 GiB uncompressed: the classic bomb header.
        assert!(gauge.check_entry(2 * 1024 * 1024 * 1024, 1024).is_err());
    }

    #[test]
    fn test_archive_gauge_accepts_honest_archive() {
        let mut gauge = ArchiveGauge::new();
        for _ in 0..100 {
            gauge.check_entry(1024 * 1024, 512 * 1024).unwrap();
        }
    }
}
