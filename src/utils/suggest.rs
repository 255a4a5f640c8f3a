fn normalize_token(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn score(input: &str, candidate: &str) -> Option<usize> {
    if input.is_empty() || candidate.is_empty() {
        return None;
    }
    if input == candidate {
        return Some(0);
    }
    if input.contains(candidate) || candidate.contains(input) {
        return Some(1);
    }
    Some(levenshtein(input, candidate))
}

fn max_allowed_distance(normalized: &str) -> usize {
    match normalized.len() {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        n => ((n as f32) * 0.35).floor().max(3.0) as usize,
    }
}

/// Ranks `candidates` by similarity to `input` and returns at most `limit` close matches.
///
/// Tool names differ mostly in separators (`list_folder` vs `listFolder`), so both sides are
/// reduced to lowercase alphanumerics before comparing.
pub fn suggest<S: AsRef<str>>(input: &str, candidates: &[S], limit: usize) -> Vec<String> {
    let needle = normalize_token(input);
    if needle.is_empty() {
        return Vec::new();
    }
    let allowed = max_allowed_distance(&needle);

    let mut scored: Vec<(&str, usize)> = candidates
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|candidate| {
            score(&needle, &normalize_token(candidate))
                .filter(|s| *s <= allowed)
                .map(|s| (candidate, s))
        })
        .collect();
    scored.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then_with(|| a.0.len().cmp(&b.0.len()))
            .then_with(|| a.0.cmp(b.0))
    });

    let mut out: Vec<String> = Vec::new();
    for (candidate, _) in scored {
        if out.iter().any(|existing| existing == candidate) {
            continue;
        }
        out.push(candidate.to_string());
        if out.len() >= limit.max(1) {
            break;
        }
    }
    out
}
