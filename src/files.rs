use std::path::Path;

fn exists(filename: &str) -> bool {
    Path::new(filename).try_exists().unwrap_or_else(|e| {
        warn!(target: "app::state", "Error checking existence of {}: {}", filename, e);
        false
    })
}

fn numbered(base: &str, n: u32, suffix: &str) -> String {
    format!("{}-{:02}.{}", base, n, suffix)
}

/// First filename in the `base-NN.suffix` sequence that doesn't exist yet.
pub fn first_available(base: &str, suffix: &str) -> String {
    let mut n = 1;
    while exists(&numbered(base, n, suffix)) {
        n += 1;
    }
    numbered(base, n, suffix)
}

/// Last filename in the `base-NN.suffix` sequence that exists, falling
/// back to `base.suffix` when none do.
pub fn last_existing(base: &str, suffix: &str) -> String {
    let mut n = 0;
    while exists(&numbered(base, n + 1, suffix)) {
        n += 1;
    }
    match n {
        0 => format!("{}.{}", base, suffix),
        n => numbered(base, n, suffix),
    }
}

pub fn config_file(name: &str) -> Option<String> {
    let home = dirs::home_dir()?;
    let filename = format!("{}/.zplet/{}", home.to_string_lossy(), name);
    exists(&filename).then_some(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_available() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("story").to_string_lossy().to_string();
        assert_eq!(first_available(&base, "ifzs"), format!("{}-01.ifzs", base));
        std::fs::write(format!("{}-01.ifzs", base), b"x").unwrap();
        assert_eq!(first_available(&base, "ifzs"), format!("{}-02.ifzs", base));
    }

    #[test]
    fn test_last_existing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("story").to_string_lossy().to_string();
        assert_eq!(last_existing(&base, "ifzs"), format!("{}.ifzs", base));
        std::fs::write(format!("{}-01.ifzs", base), b"x").unwrap();
        std::fs::write(format!("{}-02.ifzs", base), b"x").unwrap();
        assert_eq!(last_existing(&base, "ifzs"), format!("{}-02.ifzs", base));
    }
}
