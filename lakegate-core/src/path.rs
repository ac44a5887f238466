//! Repository path helpers
//!
//! Paths in the object store are `/`-separated and repository-relative.
//! Directory components keep no trailing separator unless stated.

/// Path separator used by the object store
pub const SEPARATOR: char = '/';

/// Everything before the last separator, or `""` for a top-level object.
pub fn dir_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Everything after the last separator.
pub fn base_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Lowercased extension of the file name, or `""` when there is none.
pub fn extension(path: &str) -> String {
    let name = base_name(path);
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Directory prefix of `path` including the trailing separator.
///
/// Top-level objects map to `""`.
pub fn partition_key(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Hadoop-style hidden objects: file names starting with `_` or `.`
/// (`_SUCCESS`, `.part-0.crc`, ...).
pub fn is_hadoop_hidden(path: &str) -> bool {
    let name = base_name(path);
    name.starts_with('_') || name.starts_with('.')
}

/// Delta Lake transaction log entries live under `_delta_log/` and are
/// either JSON commits or Parquet checkpoints.
pub fn is_delta_lake_log(path: &str) -> bool {
    dir_name(path).ends_with("_delta_log") && matches!(extension(path).as_str(), "json" | "parquet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_and_base_name() {
        assert_eq!(dir_name("a/b/c.parquet"), "a/b");
        assert_eq!(base_name("a/b/c.parquet"), "c.parquet");
        assert_eq!(dir_name("c.parquet"), "");
        assert_eq!(base_name("c.parquet"), "c.parquet");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("x/y/data.PARQUET"), "parquet");
        assert_eq!(extension("x/y.d/README"), "");
        assert_eq!(extension("x/archive.tar.gz"), "gz");
    }

    #[test]
    fn test_partition_key() {
        assert_eq!(partition_key("tables/hive/dt=2024-01-01/part-0"), "tables/hive/dt=2024-01-01/");
        assert_eq!(partition_key("top.csv"), "");
    }

    #[test]
    fn test_hidden_and_delta() {
        assert!(is_hadoop_hidden("t/_SUCCESS"));
        assert!(is_hadoop_hidden("t/.part-0.crc"));
        assert!(!is_hadoop_hidden("t/part-0.parquet"));
        assert!(is_delta_lake_log("t/_delta_log/00000.json"));
        assert!(is_delta_lake_log("t/_delta_log/00010.checkpoint.parquet"));
        assert!(!is_delta_lake_log("t/_delta_log/00000.crc"));
        assert!(!is_delta_lake_log("t/00000.json"));
    }
}
