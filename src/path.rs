//! Path resolution for container entry names.
//!
//! Pure string logic: an entry name such as `word/_rels/document.xml.rels`
//! becomes an [`ArchivePath`] that knows whether it names a directory, what
//! its leaf is, and which ancestor directories it implies. Nothing here
//! touches a catalog.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("malformed path {raw:?}: {reason}")]
    Malformed { raw: String, reason: &'static str },
}

fn malformed(raw: &str, reason: &'static str) -> PathError {
    PathError::Malformed { raw: raw.to_owned(), reason }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// A normalized entry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    components: Vec<String>,
    is_dir:     bool,
}

impl ArchivePath {
    /// Normalize a raw entry name.
    ///
    /// `/` and `\` both separate components; a trailing separator marks a
    /// directory. Leading separators and `.` components are dropped.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(malformed(raw, "embedded NUL byte"));
        }

        let mut components = Vec::new();
        for part in raw.split(is_separator) {
            match part {
                "" | "." => continue,
                ".." => return Err(malformed(raw, "parent directory reference")),
                p => components.push(p.to_owned()),
            }
        }
        if components.is_empty() {
            return Err(malformed(raw, "no path components"));
        }

        let is_dir = raw.ends_with(is_separator);
        Ok(Self { components, is_dir })
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The same path, classified as a directory whatever its spelling.
    pub fn into_dir(mut self) -> Self {
        self.is_dir = true;
        self
    }

    /// Final component.
    pub fn name(&self) -> &str {
        // parse() rejects empty paths
        self.components.last().map(String::as_str).unwrap_or_default()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Components of the containing directory.
    pub fn parent_components(&self) -> &[String] {
        &self.components[..self.components.len() - 1]
    }

    /// Number of directory levels: `a/b/c.txt` and `a/b/` are both 2.
    pub fn depth(&self) -> usize {
        if self.is_dir {
            self.components.len()
        } else {
            self.components.len() - 1
        }
    }

    /// Entries that live directly under the container.
    pub fn is_top_level(&self) -> bool {
        self.components.len() == 1
    }

    /// Cache key of the path itself.
    pub fn key(&self) -> String {
        self.components.join("/")
    }

    /// Cache key of the containing directory; empty at top level.
    pub fn parent_key(&self) -> String {
        self.parent_components().join("/")
    }

    /// Ancestor chain from the top level down to, but excluding, the leaf.
    pub fn ancestors(&self) -> Chain<'_> {
        Chain::new(self.parent_components())
    }

    /// Ancestor chain from the top level down to and including the leaf.
    pub fn lineage(&self) -> Chain<'_> {
        Chain::new(&self.components)
    }
}

/// One step of a [`Chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link<'a> {
    pub name:     &'a str,
    /// Components seen so far, joined with `/`.
    pub sub_path: String,
}

/// Walks a component list root-first, accumulating the sub-path.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    rest:     std::slice::Iter<'a, String>,
    sub_path: String,
}

impl<'a> Chain<'a> {
    pub fn new(components: &'a [String]) -> Self {
        Self { rest: components.iter(), sub_path: String::new() }
    }
}

impl<'a> Iterator for Chain<'a> {
    type Item = Link<'a>;

    fn next(&mut self) -> Option<Link<'a>> {
        let name = self.rest.next()?;
        if !self.sub_path.is_empty() {
            self.sub_path.push('/');
        }
        self.sub_path.push_str(name);
        Some(Link { name, sub_path: self.sub_path.clone() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rest.size_hint()
    }
}

impl ExactSizeIterator for Chain<'_> {}
