use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use arkbeam::{BeamError, ImageSource};
use image::GrayImage;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Size and modification time, enough to tell whether a file changed.
type Stamp = (u64, Option<SystemTime>);

/// Camera frames dropped into a directory by whatever grabs them. Each
/// image is consumed once, oldest name first.
///
/// An image that fails to load stays where it is. It is tried again once
/// it changes on disk, so a file caught halfway through being written is
/// not lost.
pub struct SpoolSource {
    dir: PathBuf,
    unreadable: HashMap<PathBuf, Stamp>,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> arkbeam::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| BeamError::file_io(&dir, e))?;
        Ok(Self {
            dir,
            unreadable: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&mut self) -> arkbeam::Result<Option<(PathBuf, Stamp)>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| BeamError::file_io(&self.dir, e))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| BeamError::file_io(&self.dir, e))?.path();
            if is_image(&path) {
                candidates.push(path);
            }
        }
        candidates.sort();
        // Forget files that are gone.
        self.unreadable.retain(|path, _| candidates.contains(path));

        for path in candidates {
            let Some(stamp) = stamp(&path) else {
                continue;
            };
            if self.unreadable.get(&path) != Some(&stamp) {
                return Ok(Some((path, stamp)));
            }
        }
        Ok(None)
    }
}

fn stamp(path: &Path) -> Option<Stamp> {
    let meta = fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()))
}

fn is_image(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    let known = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        });
    !hidden && known && path.is_file()
}

fn consume(path: &Path) -> arkbeam::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BeamError::file_io(path, e)),
    }
}

impl ImageSource for SpoolSource {
    type Image = GrayImage;

    fn sample(&mut self) -> arkbeam::Result<Option<GrayImage>> {
        let Some((path, stamp)) = self.next_path()? else {
            return Ok(None);
        };

        match image::open(&path) {
            Ok(image) => {
                consume(&path)?;
                self.unreadable.remove(&path);
                Ok(Some(image.to_luma8()))
            }
            Err(e) => {
                log::warn!(
                    "Cannot read image {} yet, retrying once it changes: {}",
                    path.display(),
                    e
                );
                self.unreadable.insert(path, stamp);
                Ok(None)
            }
        }
    }
}
