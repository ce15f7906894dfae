//! Reading bundles and class-path entries from disk.
//!
//! A bundle or a class-path entry is an exploded directory: class files
//! under their package directories, `packageinfo` markers, and for
//! class-path entries an optional `META-INF/MANIFEST.MF` whose
//! `Export-Package` and `Provide-Capability` headers describe the
//! dependency.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::graph::{ClasspathEntry, PackageModel};
use crate::header::{HeaderError, Parameters};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Errors that can occur while reading a directory.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to walk directory: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Invalid {header} header in {path}: {source}")]
    InvalidHeader {
        path: String,
        header: String,
        source: HeaderError,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A file of a directory, with its path relative to the root using `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Reads every file below `root`, sorted by path.
pub fn read_directory(root: &Path) -> SourceResult<Vec<Resource>> {
    if !root.is_dir() {
        return Err(SourceError::NotADirectory(root.to_path_buf()));
    }
    let mut resources = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        resources.push(Resource {
            path,
            bytes: fs::read(entry.path())?,
        });
    }
    Ok(resources)
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && matches!(entry.file_name().to_string_lossy().as_ref(), ".git" | ".svn")
}

/// Adds the classes and `packageinfo` markers below `root` to the bundle.
/// Returns the number of resources read.
pub fn load_bundle(model: &mut PackageModel, root: &Path) -> SourceResult<usize> {
    let resources = read_directory(root)?;
    for resource in &resources {
        model.add_resource(&resource.path, &resource.bytes);
    }
    debug!(root = %root.display(), resources = resources.len(), classes = model.class_count(), "loaded bundle");
    Ok(resources.len())
}

/// Adds the directory `root` as a class-path entry named after it.
pub fn load_classpath(model: &mut PackageModel, root: &Path) -> SourceResult<usize> {
    let resources = read_directory(root)?;
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());

    let entry = match resources.iter().find(|r| r.path == MANIFEST_PATH) {
        Some(manifest) => {
            let manifest = Manifest::parse(&String::from_utf8_lossy(&manifest.bytes));
            classpath_entry(&name, &manifest)?
        }
        None => ClasspathEntry::new(&name),
    };

    let index = model.add_classpath(entry);
    for resource in &resources {
        model.add_classpath_resource(index, &resource.path, &resource.bytes);
    }
    debug!(entry = %name, resources = resources.len(), "loaded class-path entry");
    Ok(index)
}

/// A class-path entry described by a manifest.
pub fn classpath_entry(name: &str, manifest: &Manifest) -> SourceResult<ClasspathEntry> {
    let mut entry = ClasspathEntry::new(name);
    entry.exports = manifest_parameters(name, manifest, "Export-Package")?;
    entry.capabilities = manifest_parameters(name, manifest, "Provide-Capability")?;
    Ok(entry)
}

fn manifest_parameters(name: &str, manifest: &Manifest, header: &str) -> SourceResult<Parameters> {
    let Some(value) = manifest.get(header) else {
        return Ok(Parameters::new());
    };
    Parameters::parse(value).map_err(|source| SourceError::InvalidHeader {
        path: format!("{name}/{MANIFEST_PATH}"),
        header: header.to_string(),
        source,
    })
}

/// Main section of a JAR manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<(String, String)>,
}

impl Manifest {
    /// Parses the main section. Continuation lines start with a single space;
    /// the section ends at the first empty line.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bundlescope::source::Manifest;
    ///
    /// let manifest = Manifest::parse("Manifest-Version: 1.0\r\nExport-Package: com.acme;ver\r\n sion=1.2\r\n");
    /// assert_eq!(manifest.get("export-package"), Some("com.acme;version=1.2"));
    /// ```
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push_str(continuation);
                }
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => headers.push((name.trim().to_string(), value.trim_start().to_string())),
                None => warn!(line, "ignoring malformed manifest line"),
            }
        }
        Self { headers }
    }

    /// Header value by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::builder::ClassFileBuilder;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bundlescope-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(root: &Path, path: &str, bytes: &[u8]) {
        let file = root.join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, bytes).unwrap();
    }

    #[test]
    fn test_manifest_continuations_and_sections() {
        let manifest = Manifest::parse(
            "Manifest-Version: 1.0\nExport-Package: a;version=1,\n b;version=2\n\nName: a/A.class\nSHA: x\n",
        );
        assert_eq!(manifest.get("Export-Package"), Some("a;version=1,b;version=2"));
        assert_eq!(manifest.get("Name"), None);
        assert_eq!(manifest.iter().count(), 2);
    }

    #[test]
    fn test_classpath_entry_from_manifest() {
        let manifest = Manifest::parse(
            "Export-Package: dep.api;version=2.1\nProvide-Capability: osgi.contract;osgi.contract=X;uses:=dep.api\n",
        );
        let entry = classpath_entry("dep", &manifest).unwrap();
        assert_eq!(entry.exports.get("dep.api").unwrap().version(), Some("2.1"));
        assert!(entry.capabilities.contains_key("osgi.contract"));

        let broken = Manifest::parse("Export-Package: a;version=\"1\n");
        assert!(matches!(
            classpath_entry("dep", &broken),
            Err(SourceError::InvalidHeader { header, .. }) if header == "Export-Package"
        ));
    }

    #[test]
    fn test_load_bundle_and_classpath() {
        let bundle = scratch("bundle");
        write(&bundle, "com/acme/Service.class", &ClassFileBuilder::new("com/acme/Service").build());
        write(&bundle, "com/acme/packageinfo", b"version 1.5");
        write(&bundle, ".git/HEAD", b"ref");

        let dep = scratch("dep");
        write(&dep, MANIFEST_PATH, b"Export-Package: dep.api;version=3.0\n");
        write(&dep, "dep/api/Api.class", &ClassFileBuilder::new("dep/api/Api").build());

        let mut model = PackageModel::default();
        assert_eq!(load_bundle(&mut model, &bundle).unwrap(), 2);
        let index = load_classpath(&mut model, &dep).unwrap();

        let acme = model.package_ref("com.acme");
        assert!(model.is_contained(&acme));
        assert_eq!(model.package_info(&acme).unwrap().marker_version.as_deref(), Some("1.5"));
        assert_eq!(model.classpath()[index].exports.get("dep.api").unwrap().version(), Some("3.0"));
        assert!(model.find_class("dep/api/Api").is_some());

        fs::remove_dir_all(bundle).unwrap();
        fs::remove_dir_all(dep).unwrap();
    }

    #[test]
    fn test_missing_directory() {
        let missing = std::env::temp_dir().join("bundlescope-does-not-exist");
        assert!(matches!(read_directory(&missing), Err(SourceError::NotADirectory(_))));
    }
}
