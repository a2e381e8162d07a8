use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{BeamError, Result};

/// Write `data` next to `dest` under a random name, then rename it over
/// `dest`. Readers see either the previous content or the new one.
pub fn write_replace(dest: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let dest = dest.as_ref();
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| BeamError::file_io(&dir, e))?;

    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(10)
        .collect();
    let tmp = dir.join(format!(".{}.tmp", suffix));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(BeamError::file_io(&tmp, e));
    }

    fs::rename(&tmp, dest).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        BeamError::file_io(dest, e)
    })
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BeamError::file_io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn replaces_existing_content() {
        let dir = TempDir::new("arkbeam").expect("Failed to create temporary directory");
        let path = dir.path().join("target.json");

        write_replace(&path, b"first").unwrap();
        write_replace(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        let dir = TempDir::new("arkbeam").expect("Failed to create temporary directory");
        assert!(!remove_if_exists(dir.path().join("nothing")).unwrap());
    }
}
