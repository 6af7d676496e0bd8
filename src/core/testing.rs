//! In-memory image backend for builder and modifier tests.

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::core::mapper::MappedNames;
use crate::error::ImageError;
use crate::iso::{fixture, Catalog, ImageAuthor, ImageBackend, ImageTree};

/// What happened to the images a [`ModelBackend`] handed out.
#[derive(Default)]
pub(crate) struct Observed {
    pub opened: Cell<usize>,
    pub closed: Cell<usize>,
    pub written: RefCell<Option<(PathBuf, ImageTree)>>,
}

pub(crate) struct ModelBackend {
    image: Vec<u8>,
    fail_write: bool,
    pub observed: Rc<Observed>,
}

impl ModelBackend {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            fail_write: false,
            observed: Rc::default(),
        }
    }

    pub fn ubuntu() -> Self {
        Self::new(fixture::ubuntu_image())
    }

    pub fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn open_image(&self) -> ModelImage {
        self.open(Path::new("ubuntu.iso")).unwrap()
    }
}

impl ImageBackend for ModelBackend {
    type Image = ModelImage;

    fn open(&self, _source: &Path) -> Result<ModelImage, ImageError> {
        let catalog = Catalog::read(Cursor::new(self.image.clone()))?;
        self.observed.opened.set(self.observed.opened.get() + 1);
        Ok(ModelImage {
            tree: ImageTree::from_catalog(&catalog),
            fail_write: self.fail_write,
            observed: Rc::clone(&self.observed),
        })
    }
}

pub(crate) struct ModelImage {
    tree: ImageTree,
    fail_write: bool,
    observed: Rc<Observed>,
}

impl ImageAuthor for ModelImage {
    fn add_directory(&mut self, names: &MappedNames) -> Result<(), ImageError> {
        self.tree.add_directory(names)
    }

    fn add_file(&mut self, source: &Path, names: &MappedNames, mode: u32) -> Result<(), ImageError> {
        self.tree.add_file(source, names, mode)
    }

    fn remove_file(&mut self, iso_path: &str) -> Result<(), ImageError> {
        self.tree.remove_file(iso_path)
    }

    fn write(&mut self, output: &Path) -> Result<(), ImageError> {
        if self.fail_write {
            return Err(ImageError::Serialize {
                path: output.to_path_buf(),
                reason: "No space left on device".to_string(),
            });
        }
        *self.observed.written.borrow_mut() = Some((output.to_path_buf(), self.tree.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), ImageError> {
        self.observed.closed.set(self.observed.closed.get() + 1);
        Ok(())
    }
}
