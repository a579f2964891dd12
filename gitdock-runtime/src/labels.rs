//! The dependency label: which repository updates restart a container.
//!
//! A container opts in with `restart-after=<repo>[,<repo>…]`. Matching is
//! exact membership of the trimmed, non-empty tokens; never substring.

/// Label key read from every container.
pub const DEPENDENCY_LABEL: &str = "restart-after";

/// Separator between repository names inside one label value.
pub const LABEL_SEPARATOR: char = ',';

/// Trimmed, non-empty repository names listed in a label value.
pub fn label_tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(LABEL_SEPARATOR)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// True when `repository` is one of the tokens of `value`.
pub fn label_matches(value: &str, repository: &str) -> bool {
    let repository = repository.trim();
    if repository.is_empty() {
        return false;
    }
    label_tokens(value).any(|token| token == repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("demo-api", "demo-api", true)]
    #[case("alpha,beta", "alpha", true)]
    #[case("alpha,beta", "beta", true)]
    #[case("  alpha ,\tbeta  ", "beta", true)]
    #[case("alpha,beta", "alp", false)]
    #[case("alpha,beta", "alpha,beta", false)]
    #[case("alpha,beta", "ab", false)]
    #[case("a,b", "a,c", false)]
    #[case("demo-api-v2", "demo-api", false)]
    #[case("alpha,", "", false)]
    #[case(",", "", false)]
    #[case("", "", false)]
    #[case("alpha,,beta", "beta", true)]
    fn exact_token_membership(#[case] label: &str, #[case] repo: &str, #[case] expected: bool) {
        assert_eq!(label_matches(label, repo), expected);
    }

    #[test]
    fn tokens_drop_empty_entries() {
        let tokens: Vec<_> = label_tokens(" a , ,b,").collect();
        assert_eq!(tokens, vec!["a", "b"]);
    }
}
