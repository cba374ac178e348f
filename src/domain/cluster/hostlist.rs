//! Hostlist expressions: `tux[0-3,7],login1` <-> individual node names.

/// Upper bound on the names a single expression may expand to.
pub const MAX_HOSTLIST_RANGE: u64 = 64 * 1024;

/// Expands a hostlist expression into node names, in expression order.
pub fn expand_hostlist(expr: &str) -> Result<Vec<String>, String> {
    let mut names = Vec::new();

    for token in split_top_level(expr)? {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        match token.find('[') {
            None => names.push(token.to_string()),
            Some(open) => {
                let close = token.rfind(']').ok_or_else(|| format!("unbalanced bracket in '{}'", token))?;
                if close < open {
                    return Err(format!("unbalanced bracket in '{}'", token));
                }
                let prefix = &token[..open];
                let suffix = &token[close + 1..];
                let body = &token[open + 1..close];
                if body.contains('[') || suffix.contains('[') {
                    return Err(format!("nested ranges are not supported in '{}'", token));
                }

                for range in body.split(',') {
                    expand_range(prefix, range.trim(), suffix, &mut names)?;
                }
            }
        }
    }

    Ok(names)
}

fn expand_range(prefix: &str, range: &str, suffix: &str, names: &mut Vec<String>) -> Result<(), String> {
    let (low, high) = match range.split_once('-') {
        Some((low, high)) => (low, high),
        None => (range, range),
    };

    if low.is_empty() || !low.bytes().all(|b| b.is_ascii_digit()) || !high.bytes().all(|b| b.is_ascii_digit()) || high.is_empty() {
        return Err(format!("invalid range '{}'", range));
    }

    let width = if low.len() > 1 && low.starts_with('0') { low.len() } else { 0 };
    let low_value: u64 = low.parse().map_err(|_| format!("invalid range '{}'", range))?;
    let high_value: u64 = high.parse().map_err(|_| format!("invalid range '{}'", range))?;

    if high_value < low_value {
        return Err(format!("descending range '{}'", range));
    }
    if (high_value - low_value).saturating_add(1).saturating_add(names.len() as u64) > MAX_HOSTLIST_RANGE {
        return Err(format!("too many hosts in range '{}'", range));
    }

    for value in low_value..=high_value {
        names.push(format!("{}{:0width$}{}", prefix, value, suffix, width = width));
    }
    Ok(())
}

fn split_top_level(expr: &str) -> Result<Vec<&str>, String> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (pos, ch) in expr.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced bracket in '{}'", expr));
                }
            }
            ',' if depth == 0 => {
                tokens.push(&expr[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("unbalanced bracket in '{}'", expr));
    }
    tokens.push(&expr[start..]);
    Ok(tokens)
}

/// Compresses node names (given in node table order) into a hostlist expression.
/// Adjacent names sharing a prefix and number width are folded into one bracket.
pub fn compress_hostlist<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut parts: Vec<Part> = Vec::new();

    for name in names {
        let Some((prefix, digits, value)) = split_numeric_suffix(name) else {
            parts.push(Part::Plain(name.to_string()));
            continue;
        };
        let width = if digits.len() > 1 && digits.starts_with('0') { digits.len() } else { 0 };

        match parts.last_mut() {
            Some(Part::Group { prefix: last_prefix, width: last_width, values }) if last_prefix == prefix && *last_width == width => values.push(value),
            _ => parts.push(Part::Group { prefix: prefix.to_string(), width, values: vec![value] }),
        }
    }

    let rendered: Vec<String> = parts
        .iter()
        .map(|part| match part {
            Part::Plain(name) => name.clone(),
            Part::Group { prefix, width, values } if values.len() == 1 => format!("{}{:0width$}", prefix, values[0], width = *width),
            Part::Group { prefix, width, values } => format!("{}[{}]", prefix, render_ranges(values, *width)),
        })
        .collect();

    rendered.join(",")
}

enum Part {
    Plain(String),
    Group { prefix: String, width: usize, values: Vec<u64> },
}

fn render_ranges(values: &[u64], width: usize) -> String {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut low, mut high) = (first, first);

    for value in iter {
        if value == high + 1 {
            high = value;
        } else {
            ranges.push(render_range(low, high, width));
            low = value;
            high = value;
        }
    }
    ranges.push(render_range(low, high, width));
    ranges.join(",")
}

fn render_range(low: u64, high: u64, width: usize) -> String {
    if low == high { format!("{:0width$}", low, width = width) } else { format!("{:0width$}-{:0width$}", low, high, width = width) }
}

fn split_numeric_suffix(name: &str) -> Option<(&str, &str, u64)> {
    let digits_start = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits_start == name.len() || digits_start == 0 {
        return None;
    }
    let digits = &name[digits_start..];
    let value = digits.parse().ok()?;
    Some((&name[..digits_start], digits, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_mixed_expression() {
        let names = expand_hostlist("tux[0-2,5],login1, gpu07").unwrap();
        assert_eq!(names, vec!["tux0", "tux1", "tux2", "tux5", "login1", "gpu07"]);
    }

    #[test]
    fn test_expand_keeps_zero_padding() {
        let names = expand_hostlist("n[08-10]").unwrap();
        assert_eq!(names, vec!["n08", "n09", "n10"]);
    }

    #[test]
    fn test_expand_rejects_malformed_expressions() {
        assert!(expand_hostlist("tux[1-3").is_err());
        assert!(expand_hostlist("tux1-3]").is_err());
        assert!(expand_hostlist("tux[3-1]").is_err());
        assert!(expand_hostlist("tux[a-b]").is_err());
    }

    #[test]
    fn test_expand_rejects_oversized_ranges() {
        assert!(expand_hostlist("tux[0-4000000000]").is_err());
        assert!(expand_hostlist("tux[0-65536]").is_err());
        assert_eq!(expand_hostlist("tux[0-65535]").unwrap().len(), MAX_HOSTLIST_RANGE as usize);

        // the bound covers the whole expression, not each range
        assert!(expand_hostlist("tux[0-40000],gpu[0-40000]").is_err());
        assert!(expand_hostlist("tux[0-40000,50000-90000]").is_err());
    }

    #[test]
    fn test_compress_folds_adjacent_runs() {
        let compressed = compress_hostlist(["tux0", "tux1", "tux2", "tux5", "login1"]);
        assert_eq!(compressed, "tux[0-2,5],login1");
        assert_eq!(compress_hostlist(["tux3"]), "tux3");
        assert_eq!(compress_hostlist(["head"]), "head");
        assert_eq!(compress_hostlist(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_compress_then_expand_restores_names() {
        let names = vec!["n01", "n02", "n03", "n07"];
        let compressed = compress_hostlist(names.iter().copied());
        assert_eq!(compressed, "n[01-03,07]");
        assert_eq!(expand_hostlist(&compressed).unwrap(), names);
    }
}
