//! Request path → content path (the candidate application context path).

/// First path segment as `/<segment>`.
///
/// An empty segment, or one containing `.` (a file at the top level such as
/// `/favicon.ico`), belongs to the root application: `/`.
pub fn content_path(path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let segment = trimmed.split('/').next().unwrap_or_default();
    if segment.is_empty() || segment.contains('.') {
        "/".to_string()
    } else {
        format!("/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment() {
        assert_eq!(content_path("/shop/catalog/1"), "/shop");
        assert_eq!(content_path("/shop"), "/shop");
        assert_eq!(content_path("/shop/"), "/shop");
    }

    #[test]
    fn root_cases() {
        assert_eq!(content_path("/"), "/");
        assert_eq!(content_path(""), "/");
        assert_eq!(content_path("//double"), "/");
        assert_eq!(content_path("/favicon.ico"), "/");
        assert_eq!(content_path("/v1.2/api"), "/");
    }
}
