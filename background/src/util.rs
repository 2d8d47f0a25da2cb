static TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_"];

/// Replace token-shaped substrings with a placeholder. Remote error bodies
/// occasionally echo request credentials back; nothing token-shaped may
/// reach the log output or a displayed error.
pub fn redact_secrets(value: &str) -> String {
    let mut redacted = String::with_capacity(value.len());
    let mut index = 0;
    while index < value.len() {
        let rest = &value[index..];
        if TOKEN_PREFIXES.iter().any(|prefix| rest.starts_with(prefix)) {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            redacted.push_str("[redacted]");
            index += end;
        } else {
            let Some(character) = rest.chars().next() else {
                break;
            };
            redacted.push(character);
            index += character.len_utf8();
        }
    }
    redacted
}
