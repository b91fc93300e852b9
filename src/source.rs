use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;
use zip::ZipArchive;

use crate::descriptor::{ComponentDescriptor, ComponentKey};
use crate::error::SbomError;

/// File extensions considered when indexing descriptors
const DESCRIPTOR_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Repository of component descriptors
pub trait DescriptorSource {
    fn get_component(&self, name: &str, version: &str) -> Result<ComponentDescriptor, SbomError>;
}

/// Where descriptors are read from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLocation {
    /// Local directory tree (or a single descriptor file)
    Directory(PathBuf),
    /// Zip archive containing descriptor files
    ZipFile(PathBuf),
    /// URL template with `{name}` and `{version}` placeholders
    UrlTemplate(String),
}

impl SourceLocation {
    /// Classify a command line argument
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            SourceLocation::UrlTemplate(input.to_string())
        } else if input.to_ascii_lowercase().ends_with(".zip") {
            SourceLocation::ZipFile(PathBuf::from(input))
        } else {
            SourceLocation::Directory(PathBuf::from(input))
        }
    }

    pub fn open(&self, http_timeout: Duration) -> Result<Box<dyn DescriptorSource>, SbomError> {
        Ok(match self {
            SourceLocation::Directory(path) => Box::new(DirectorySource::open(path)?),
            SourceLocation::ZipFile(path) => Box::new(ZipSource::open(path)?),
            SourceLocation::UrlTemplate(template) => {
                Box::new(HttpSource::new(template.clone(), http_timeout)?)
            }
        })
    }
}

/// Descriptors held in memory, keyed by name and version
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    descriptors: HashMap<ComponentKey, ComponentDescriptor>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor; the first one registered for a key wins
    pub fn insert(&mut self, descriptor: ComponentDescriptor) -> bool {
        let key = descriptor.key();
        if self.descriptors.contains_key(&key) {
            warn!(component = %key, "Duplicate descriptor ignored");
            return false;
        }
        self.descriptors.insert(key, descriptor);
        true
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DescriptorSource for MemorySource {
    fn get_component(&self, name: &str, version: &str) -> Result<ComponentDescriptor, SbomError> {
        let key = ComponentKey::new(name, version);
        self.descriptors
            .get(&key)
            .cloned()
            .ok_or_else(|| SbomError::DescriptorFetchFailed {
                component: key.to_string(),
                reason: "descriptor not found".to_string(),
            })
    }
}

/// Descriptors indexed from a local directory tree
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    index: MemorySource,
}

impl DirectorySource {
    pub fn open(path: &Path) -> Result<Self, SbomError> {
        if !path.exists() {
            return Err(SbomError::InvalidPath(path.to_path_buf()));
        }

        let mut index = MemorySource::new();
        for file in collect_descriptor_files(path)? {
            let content = std::fs::read_to_string(&file)?;
            match ComponentDescriptor::parse(&content, &file.display().to_string()) {
                Ok(descriptor) => {
                    index.insert(descriptor);
                }
                Err(e) => debug!("Skipping {}: {}", file.display(), e),
            }
        }

        debug!(
            "Indexed {} descriptors under {}",
            index.len(),
            path.display()
        );
        Ok(DirectorySource {
            root: path.to_path_buf(),
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DescriptorSource for DirectorySource {
    fn get_component(&self, name: &str, version: &str) -> Result<ComponentDescriptor, SbomError> {
        self.index.get_component(name, version)
    }
}

fn has_descriptor_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DESCRIPTOR_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Walk a directory without recursion, returning descriptor candidates in
/// sorted order
fn collect_descriptor_files(path: &Path) -> Result<Vec<PathBuf>, SbomError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(entry_path);
            } else if has_descriptor_extension(&entry.file_name().to_string_lossy()) {
                files.push(entry_path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Descriptors indexed from the entries of a zip archive
#[derive(Debug, Clone)]
pub struct ZipSource {
    index: MemorySource,
}

impl ZipSource {
    pub fn open(path: &Path) -> Result<Self, SbomError> {
        if !path.exists() {
            return Err(SbomError::InvalidPath(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| SbomError::InvalidDescriptor {
            path: path.display().to_string(),
            reason: format!("Failed to read zip archive: {}", e),
        })?;

        let index = index_zip_archive(&mut archive, path)?;
        debug!("Indexed {} descriptors in {}", index.len(), path.display());
        Ok(ZipSource { index })
    }
}

impl DescriptorSource for ZipSource {
    fn get_component(&self, name: &str, version: &str) -> Result<ComponentDescriptor, SbomError> {
        self.index.get_component(name, version)
    }
}

fn index_zip_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    zip_path: &Path,
) -> Result<MemorySource, SbomError> {
    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && has_descriptor_extension(name))
        .map(str::to_string)
        .collect();
    entries.sort();

    let mut index = MemorySource::new();
    for entry in entries {
        let origin = format!("{}!{}", zip_path.display(), entry);
        let mut file = archive
            .by_name(&entry)
            .map_err(|e| SbomError::InvalidDescriptor {
                path: origin.clone(),
                reason: format!("Failed to extract entry: {}", e),
            })?;

        let mut content = String::new();
        if let Err(e) = file.read_to_string(&mut content) {
            debug!("Skipping {}: {}", origin, e);
            continue;
        }

        match ComponentDescriptor::parse(&content, &origin) {
            Ok(descriptor) => {
                index.insert(descriptor);
            }
            Err(e) => debug!("Skipping {}: {}", origin, e),
        }
    }

    Ok(index)
}

/// Descriptors fetched over HTTP from a URL template
#[derive(Debug, Clone)]
pub struct HttpSource {
    template: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self, SbomError> {
        let template = template.into();
        if !template.contains("{name}") {
            return Err(SbomError::Config(format!(
                "URL template '{}' has no {{name}} placeholder",
                template
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SbomError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpSource { template, client })
    }

    /// Expand the template for one component version
    pub fn url_for(&self, name: &str, version: &str) -> Result<Url, SbomError> {
        let expanded = self
            .template
            .replace("{name}", name)
            .replace("{version}", version);

        Url::parse(&expanded).map_err(|e| SbomError::DescriptorFetchFailed {
            component: ComponentKey::new(name, version).to_string(),
            reason: format!("Invalid URL '{}': {}", expanded, e),
        })
    }
}

impl DescriptorSource for HttpSource {
    fn get_component(&self, name: &str, version: &str) -> Result<ComponentDescriptor, SbomError> {
        let url = self.url_for(name, version)?;
        let fetch_failed = |reason: String| SbomError::DescriptorFetchFailed {
            component: ComponentKey::new(name, version).to_string(),
            reason,
        };

        debug!("Fetching descriptor from {}", url);
        let content = self
            .client
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| fetch_failed(format!("HTTP request failed: {}", e)))?
            .text()
            .map_err(|e| fetch_failed(format!("Failed to read response: {}", e)))?;

        ComponentDescriptor::parse(&content, url.as_str())
    }
}
