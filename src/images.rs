use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;

/// The directory profile images are looked up in.
#[derive(Debug, Clone)]
pub(crate) struct Images {
    dir: PathBuf,
}

impl Images {
    pub(crate) fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the image with the given file name would be.
    /// Names that could escape the directory are refused.
    pub(crate) fn path(&self, name: &str) -> Option<PathBuf> {
        let escapes = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\');

        (!escapes).then(|| self.dir.join(name))
    }

    /// Read an image's bytes.
    /// `None` if there is no such (readable) file.
    pub(crate) fn load(&self, name: &str) -> Option<Vec<u8>> {
        let Some(path) = self.path(name) else {
            debug!(%name, "Refusing image name");
            return None;
        };

        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(?path, ?e, "Image not readable");
                None
            }
        }
    }

    /// Names of the files in the directory, sorted.
    pub(crate) fn list(&self) -> Result<Vec<String>, Error> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::InternalIssue(format!("Could not list {:?}: {e}", self.dir)))?;

        let mut names = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn load_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gif"), [1, 2, 3]).unwrap();

        let images = Images::new(dir.path());

        assert_eq!(images.load("a.gif"), Some(vec![1, 2, 3]));
        assert_eq!(images.load("b.gif"), None);
    }

    #[test]
    fn no_escaping() {
        let dir = tempfile::tempdir().unwrap();
        let images = Images::new(dir.path().join("inner"));

        std::fs::create_dir(images.dir()).unwrap();
        std::fs::write(dir.path().join("secret"), [1]).unwrap();

        assert_eq!(images.load("../secret"), None);
        assert_eq!(images.load(".."), None);
        assert_eq!(images.load(""), None);
    }

    #[test]
    fn list_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.gif"), [1]).unwrap();
        std::fs::write(dir.path().join("a.gif"), [1]).unwrap();
        std::fs::create_dir(dir.path().join("thumbs")).unwrap();

        let images = Images::new(dir.path());

        assert_eq!(images.list().unwrap(), vec!["a.gif", "b.gif"]);
        assert!(Images::new(dir.path().join("missing")).list().is_err());
    }
}
