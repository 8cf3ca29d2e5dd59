use regex::Regex;

/// Compiled exclude-pattern filter applied to every file-gathering input.
///
/// Patterns use glob syntax: `*` matches within a path segment, `**` matches
/// across segments, `?` matches a single character. A pattern without a path
/// separator also matches against the final path component, so `*.log` drops
/// `logs/build.log`. Matching treats `/` and `\` as equivalent separators.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    rules: Vec<ExcludeRule>,
}

#[derive(Debug, Clone)]
struct ExcludeRule {
    regex: Regex,
    /// Pattern contains no separator, so it is also tried against the
    /// path's file name.
    bare: bool,
}

impl ExcludeFilter {
    pub fn new(patterns: &[String]) -> Self {
        let rules = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|pattern| ExcludeRule {
                regex: Regex::new(&glob_to_regex(pattern)).expect("glob translation is escaped"),
                bare: !pattern.contains('/') && !pattern.contains('\\'),
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if the path matches any exclude pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);

        self.rules.iter().any(|rule| {
            rule.regex.is_match(&normalized) || (rule.bare && rule.regex.is_match(file_name))
        })
    }

    /// Drop excluded entries, preserving the input order of survivors.
    pub fn filter<'a, I>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        items
            .into_iter()
            .filter(|item| !self.is_excluded(item))
            .cloned()
            .collect()
    }
}

/// Translate one glob pattern into an anchored regex over `/`-separated paths.
fn glob_to_regex(pattern: &str) -> String {
    let normalized = pattern.replace('\\', "/");
    let mut regex = String::with_capacity(normalized.len() + 8);
    regex.push('^');

    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` at a segment boundary also matches zero segments
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}
