use std::env;
use std::path::{Path, PathBuf};

/// Directories holding installed library sources (crates.io registry,
/// git checkouts, toolchain `std`). Files below them are left out of the
/// reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryRoots {
    roots: Vec<PathBuf>,
}

impl LibraryRoots {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        LibraryRoots {
            roots: roots.into_iter().collect(),
        }
    }

    /// Exclude nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Roots of the current user's cargo and rustup installations
    pub fn detect() -> Self {
        Self::from_homes(
            env::var_os("CARGO_HOME").map(PathBuf::from),
            env::var_os("RUSTUP_HOME").map(PathBuf::from),
            env::var_os("HOME").map(PathBuf::from),
        )
    }

    /// Roots derived from explicit `CARGO_HOME`, `RUSTUP_HOME` and `HOME`
    /// values, falling back to `~/.cargo` and `~/.rustup`
    pub fn from_homes(
        cargo_home: Option<PathBuf>,
        rustup_home: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> Self {
        let cargo_home = cargo_home.or_else(|| home.as_ref().map(|h| h.join(".cargo")));
        let rustup_home = rustup_home.or_else(|| home.as_ref().map(|h| h.join(".rustup")));

        let mut roots = Vec::new();
        if let Some(cargo) = cargo_home {
            roots.push(cargo.join("registry"));
            roots.push(cargo.join("git"));
        }
        if let Some(rustup) = rustup_home {
            roots.push(rustup.join("toolchains"));
        }
        LibraryRoots { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// True if `path` lies below one of the roots
    pub fn contains(&self, path: &Path) -> bool {
        path.ancestors()
            .skip(1)
            .any(|ancestor| self.roots.iter().any(|root| root == ancestor))
    }

    /// True if `path` is an existing file outside every root
    pub fn is_renderable(&self, path: &Path) -> bool {
        path.is_file() && !self.contains(path)
    }
}
