//! Repository URL helpers: SSH detection, shape validation, name extraction.

use crate::error::SyncError;

/// `git@host:owner/name.git`, `ssh://…` and other scp-style `user@host:path`.
pub fn is_ssh_url(url: &str) -> bool {
    let url = url.trim();
    if url.starts_with("ssh://") {
        return true;
    }
    if url.contains("://") {
        return false;
    }
    match (url.find('@'), url.find(':')) {
        (Some(at), Some(colon)) => at < colon,
        _ => false,
    }
}

/// Derive a filesystem-safe working-copy directory name from a fetch URL.
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`; an empty result is
/// `unknown`.
pub fn extract_repo_name(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or_default();
    let last = last.strip_suffix(".git").unwrap_or(last);
    let sanitized: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Check that `url` looks like a fetchable SSH or HTTP(S) repository URL.
pub fn validate_git_url(url: &str) -> Result<(), SyncError> {
    let url = url.trim();
    let invalid = |reason: &str| SyncError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    if url.is_empty() {
        return Err(invalid("empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
    {
        let (host, path) = rest.split_once('/').ok_or_else(|| invalid("missing repository path"))?;
        let host = host.rsplit('@').next().unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if path.trim_matches('/').is_empty() {
            return Err(invalid("missing repository path"));
        }
        return Ok(());
    }

    if is_ssh_url(url) {
        let (user_host, path) = url.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        let host = user_host.rsplit('@').next().unwrap_or_default();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if path.trim_matches('/').is_empty() {
            return Err(invalid("missing repository path"));
        }
        return Ok(());
    }

    Err(invalid("expected an SSH (git@host:owner/name) or HTTP(S) URL"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("git@github.com:owner/demo-api.git", true)]
    #[case("ssh://git@example.com/owner/demo-api.git", true)]
    #[case("deploy@10.0.0.5:srv/app", true)]
    #[case("https://github.com/owner/demo-api.git", false)]
    #[case("https://user@github.com/owner/demo-api.git", false)]
    #[case("/srv/git/demo-api", false)]
    fn ssh_detection(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_ssh_url(url), expected);
    }

    #[rstest]
    #[case("git@github.com:owner/demo-api.git", "demo-api")]
    #[case("https://github.com/owner/demo-api.git/", "demo-api")]
    #[case("https://github.com/owner/demo-api", "demo-api")]
    #[case("git@host:My Repo!.git", "My_Repo_")]
    #[case("https://github.com/", "github.com")]
    #[case("", "unknown")]
    fn repo_name_extraction(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(extract_repo_name(url), expected);
    }

    #[rstest]
    #[case("git@github.com:owner/demo-api.git")]
    #[case("https://github.com/owner/demo-api.git")]
    #[case("ssh://git@example.com:2222/owner/demo-api.git")]
    fn accepts_well_formed_urls(#[case] url: &str) {
        assert!(validate_git_url(url).is_ok(), "{url}");
    }

    #[rstest]
    #[case("")]
    #[case("https://github.com")]
    #[case("git@github.com:")]
    #[case("ftp://example.com/repo.git")]
    #[case("just-a-name")]
    fn rejects_malformed_urls(#[case] url: &str) {
        assert!(matches!(
            validate_git_url(url),
            Err(SyncError::InvalidUrl { .. })
        ));
    }
}
