/// Match a key against a SCAN-style pattern where `*` matches any run of
/// characters (including none). All other characters match literally.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];

    for middle in &parts[1..parts.len() - 1] {
        if middle.is_empty() {
            continue;
        }
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern() {
        assert!(glob_match("online-players", "online-players"));
        assert!(!glob_match("online-players", "online-player"));
    }

    #[test]
    fn session_pattern_matches_player_segment() {
        let pattern = "session:*:3:*";
        assert!(glob_match(pattern, "session:pvp:3:9"));
        assert!(glob_match(pattern, "session:pve:3:1001"));
        assert!(!glob_match(pattern, "session:pvp:33:9"));
        assert!(!glob_match(pattern, "session:pvp:9:3"));
        assert!(!glob_match(pattern, "lastRound:pvp:3:9"));
    }

    #[test]
    fn trailing_and_leading_star() {
        assert!(glob_match("lock:equip:4:*", "lock:equip:4:7:enhance"));
        assert!(glob_match("*:top100", "lb:realm:top100"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn suffix_does_not_overlap_prefix() {
        assert!(!glob_match("ab*ba", "aba"));
        assert!(glob_match("ab*ba", "abba"));
    }
}
