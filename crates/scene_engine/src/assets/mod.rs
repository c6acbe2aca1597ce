//! Asset loading
//!
//! The engine only needs two kinds of external data: triangle meshes and
//! images. Both come through the [`ResourceLoader`] trait so applications
//! can swap in packed archives or generated content.

mod image_loader;
mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::ObjLoader;

use crate::foundation::geometry::Triangle;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be read
    #[error("IO error reading {path:?}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed model data
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// Image could not be decoded
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// No loader for this file type
    #[error("Unsupported asset format: {0:?}")]
    UnsupportedFormat(PathBuf),
}

/// Source of meshes and images
pub trait ResourceLoader: Send + Sync {
    /// Load a mesh as a flat triangle list
    fn load_triangles(&self, path: &Path) -> Result<Vec<Triangle>, AssetError>;

    /// Load an image as tightly packed 8-bit pixels
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError>;
}

/// Loader reading files relative to an asset root
#[derive(Debug, Clone)]
pub struct FileResourceLoader {
    root: PathBuf,
}

impl FileResourceLoader {
    /// Loader resolving relative paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Asset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ResourceLoader for FileResourceLoader {
    fn load_triangles(&self, path: &Path) -> Result<Vec<Triangle>, AssetError> {
        let path = self.resolve(path);
        let is_obj = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"));
        if !is_obj {
            return Err(AssetError::UnsupportedFormat(path));
        }
        ObjLoader::load_file(&path)
    }

    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError> {
        ImageData::from_file(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_loader_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tri.obj"), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let loader = FileResourceLoader::new(dir.path());
        let triangles = loader.load_triangles(Path::new("tri.obj")).unwrap();
        assert_eq!(triangles.len(), 1);
    }

    #[test]
    fn test_unknown_mesh_format_is_rejected() {
        let loader = FileResourceLoader::new(".");
        assert!(matches!(
            loader.load_triangles(Path::new("model.fbx")),
            Err(AssetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileResourceLoader::new(dir.path());
        match loader.load_triangles(Path::new("missing.obj")) {
            Err(AssetError::Io { path, .. }) => assert!(path.ends_with("missing.obj")),
            other => panic!("expected IO error, got {other:?}"),
        }
    }

    #[test]
    fn test_file_loader_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let mut image = image::RgbaImage::new(2, 3);
        image.put_pixel(1, 2, image::Rgba([10, 20, 30, 255]));
        image.save(&path).unwrap();

        let loaded = FileResourceLoader::new(dir.path()).load_image(Path::new("checker.png")).unwrap();
        assert_eq!((loaded.width, loaded.height, loaded.channels), (2, 3, 4));
        assert_eq!(loaded.pixel(1, 2), Some([10, 20, 30, 255]));
    }
}
