/// Canonical route form: leading `/`, no trailing `/` except for the root.
///
/// Every path comparison in the crate goes through this function.
pub fn canonical_path(path_like: &str) -> String {
    let value = path_like.trim();
    if value.is_empty() || value == "/" {
        return "/".to_owned();
    }

    let mut out = if value.starts_with('/') {
        value.to_owned()
    } else {
        format!("/{value}")
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

pub fn same_path(a: &str, b: &str) -> bool {
    canonical_path(a) == canonical_path(b)
}

pub fn path_to_slug_parts(path_like: &str) -> Vec<String> {
    let path = canonical_path(path_like);
    if path == "/" {
        return Vec::new();
    }
    path[1..].split('/').map(str::to_owned).collect()
}

pub fn slug_parts_to_path<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.is_empty() {
        return "/".to_owned();
    }
    let joined = parts
        .iter()
        .map(|part| part.as_ref())
        .collect::<Vec<_>>()
        .join("/");
    canonical_path(&format!("/{joined}"))
}

/// `/feed` suffixes and `/feed/` segments come from WordPress RSS endpoints.
pub fn is_feed_path(path: &str) -> bool {
    path.ends_with("/feed") || path.contains("/feed/")
}
