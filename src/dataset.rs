/// Discovery of labelled images in a dataset laid out as
/// `{root}/{split}/{class}/{image}`.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::{ClassNames, LabelledImage};

pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

pub struct Dataset
{
    root: PathBuf,
    classes: ClassNames,
}

impl Dataset
{
    /// Opens a dataset and collects the class names found under the given splits.
    /// Classes are the union across splits, so a class missing from one split
    /// still gets the same label everywhere.
    pub fn open<P: AsRef<Path>>(root: P, splits: &[&str]) -> Result<Self>
    {
        let root = root.as_ref().to_path_buf();
        let mut names: Vec<String> = Vec::new();
        for split in splits {
            let split_dir = root.join(split);
            if !split_dir.is_dir() {
                return Err(Error::MissingSplit(split_dir));
            }
            for entry in std::fs::read_dir(&split_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => warn!("Skipping class directory with a non UTF-8 name: {:?}", entry.path()),
                }
            }
        }
        let classes = ClassNames::new(names);
        info!("Found {} classes in {:?}", classes.len(), root);
        Ok(Dataset { root, classes })
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    pub fn classes(&self) -> &ClassNames
    {
        &self.classes
    }

    /// Lists the images of a split, sorted by path.
    pub fn split(&self, name: &str) -> Result<Vec<LabelledImage>>
    {
        let split_dir = self.root.join(name);
        if !split_dir.is_dir() {
            return Err(Error::MissingSplit(split_dir));
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(&split_dir).min_depth(2).max_depth(2).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_image_file(entry.path()) {
                debug!("Ignoring {:?}", entry.path());
                continue;
            }
            let class_name = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            let class_name = match class_name {
                Some(class_name) => class_name,
                None => {
                    warn!("Skipping {:?}: class directory name is not valid UTF-8", entry.path());
                    continue;
                }
            };
            images.push(LabelledImage {
                path: entry.path().to_path_buf(),
                label: self.classes.label_of(class_name)?,
            });
        }

        info!("Split {:?} has {} images", name, images.len());
        Ok(images)
    }
}

pub fn is_image_file(path: &Path) -> bool
{
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}
