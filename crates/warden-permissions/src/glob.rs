/// Minimal glob matching for resource patterns: `*` matches any run of
/// characters, `?` matches exactly one. No character classes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    // Classic two-pointer with backtracking on the last `*`.
    let (mut p, mut t) = (0usize, 0usize);
    let (mut star, mut star_t) = (None::<usize>, 0usize);
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Conservative subsumption: does every string matched by `child` also
/// match `parent`? Exact for the pattern shapes used in resource lists
/// (literals, `*`, and `prefix*` / `*suffix` forms); unknown combinations
/// answer `false`, which can only narrow, never widen.
pub fn pattern_subsumes(parent: &str, child: &str) -> bool {
    if parent == child || parent == "*" {
        return true;
    }
    let child_is_literal = !child.contains('*') && !child.contains('?');
    if child_is_literal {
        return glob_match(parent, child);
    }
    // prefix* under prefix*: parent prefix must be a prefix of child's.
    if let (Some(parent_prefix), Some(child_prefix)) =
        (parent.strip_suffix('*'), child.strip_suffix('*'))
    {
        if !parent_prefix.contains('*')
            && !child_prefix.contains('*')
            && child_prefix.starts_with(parent_prefix)
        {
            return true;
        }
    }
    // *suffix under *suffix.
    if let (Some(parent_suffix), Some(child_suffix)) =
        (parent.strip_prefix('*'), child.strip_prefix('*'))
    {
        if !parent_suffix.contains('*')
            && !child_suffix.contains('*')
            && child_suffix.ends_with(parent_suffix)
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_literals() {
        assert!(glob_match("a/b", "a/b"));
        assert!(!glob_match("a/b", "a/c"));
    }

    #[test]
    fn test_glob_match_star() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("data/*", "data/reports"));
        assert!(glob_match("*.json", "config.json"));
        assert!(!glob_match("data/*", "logs/reports"));
        assert!(glob_match("a*c", "abbbc"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(!glob_match("file?.txt", "file12.txt"));
    }

    #[test]
    fn test_subsumption() {
        assert!(pattern_subsumes("*", "data/*"));
        assert!(pattern_subsumes("data/*", "data/reports/*"));
        assert!(pattern_subsumes("data/*", "data/x.json"));
        assert!(!pattern_subsumes("data/*", "logs/*"));
        assert!(!pattern_subsumes("data/x.json", "data/*"));
        assert!(pattern_subsumes("*.json", "*.json"));
    }
}
