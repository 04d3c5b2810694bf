use std::{
    borrow::Cow,
    collections::HashMap,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{pipeline::capture_device_errors, Framework, Shader};

pub type ShaderResult<T> = Result<T, ShaderError>;

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("shader {0:?} has no usable file name")]
    InvalidName(PathBuf),
    #[error("no shader named {0:?}")]
    NotFound(String),
    #[error("shader {name:?} failed to compile: {source}")]
    Compile { name: String, source: wgpu::Error },
}

impl Shader {
    /// Compiles `WGSL` source into a [`Shader`]. Validation errors are returned
    /// instead of reaching the device's uncaptured error handler.
    pub fn from_wgsl_source(fw: &Framework, label: &str, source: &str) -> ShaderResult<Self> {
        let module = capture_device_errors(&fw.device, || {
            fw.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            })
        })
        .map_err(|err| ShaderError::Compile {
            name: label.to_string(),
            source: err,
        })?;

        Ok(Self(module))
    }

    /// Initialises a [`Shader`] from a `WGSL` file.
    pub fn from_wgsl_file(fw: &Framework, path: impl AsRef<Path>) -> ShaderResult<Self> {
        let source_string = std::fs::read_to_string(&path)?;
        let label = path.as_ref().to_string_lossy();
        Self::from_wgsl_source(fw, &label, &source_string)
    }

    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.0
    }
}

/// Shaders loaded from one directory, keyed by file stem.
#[derive(Debug)]
pub struct ShaderLibrary {
    dir: PathBuf,
    shaders: HashMap<String, Shader>,
}

impl ShaderLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            shaders: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compiles one file and stores it under its file stem, replacing any shader
    /// with the same name. Relative paths resolve against the library directory.
    pub fn add_wgsl_file(&mut self, fw: &Framework, path: impl AsRef<Path>) -> ShaderResult<String> {
        let path = self.dir.join(path);
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ShaderError::InvalidName(path.clone()))?
            .to_string();

        let shader = Shader::from_wgsl_file(fw, &path)?;
        if self.shaders.insert(name.clone(), shader).is_some() {
            log::debug!("Replaced shader {}", name);
        }

        Ok(name)
    }

    /// Loads every `*.wgsl` file in the library directory. Returns how many were loaded.
    pub fn scan(&mut self, fw: &Framework) -> ShaderResult<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "wgsl") {
                self.add_wgsl_file(fw, entry.file_name())?;
                loaded += 1;
            }
        }
        log::info!("Loaded {} shaders from {}", loaded, self.dir.display());

        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> ShaderResult<&Shader> {
        self.shaders
            .get(name)
            .ok_or_else(|| ShaderError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shaders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
