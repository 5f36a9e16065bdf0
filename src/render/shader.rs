use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::debug;

/// Shaders compiled into the binary, keyed by their path under the crate root.
#[cfg(feature = "embedded-assets")]
pub const EMBEDDED_SHADERS: &[(&str, &str)] = &[
    (
        "assets/shaders/camera.wgsl",
        include_str!("../../assets/shaders/camera.wgsl"),
    ),
    (
        "assets/shaders/cube.wgsl",
        include_str!("../../assets/shaders/cube.wgsl"),
    ),
    (
        "assets/shaders/shading.wgsl",
        include_str!("../../assets/shaders/shading.wgsl"),
    ),
    (
        "assets/shaders/geometry.wgsl",
        include_str!("../../assets/shaders/geometry.wgsl"),
    ),
    (
        "assets/shaders/boxes.wgsl",
        include_str!("../../assets/shaders/boxes.wgsl"),
    ),
    (
        "assets/shaders/occlusion.wgsl",
        include_str!("../../assets/shaders/occlusion.wgsl"),
    ),
];

#[derive(Clone, Copy, Debug)]
pub enum ShaderSource {
    Disk,
    Embedded(&'static [(&'static str, &'static str)]),
}

impl ShaderSource {
    pub const fn default_source() -> Self {
        #[cfg(feature = "embedded-assets")]
        return Self::Embedded(EMBEDDED_SHADERS);

        #[cfg(not(feature = "embedded-assets"))]
        return Self::Disk;
    }

    fn read(&self, path: &Path) -> Result<String, ShaderError> {
        match self {
            Self::Disk => Ok(fs::read_to_string(path)?),
            Self::Embedded(files) => (files.iter())
                .find(|(name, _)| Path::new(name) == path)
                .map(|(_, source)| source.to_string())
                .ok_or_else(|| ShaderError::FileNotFound(path.to_path_buf())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderInclude {
    pub path: PathBuf,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ShaderFile {
    pub pragma_once: bool,
    pub path: PathBuf,
    pub lines: Vec<String>,
    pub includes: Vec<ShaderInclude>,
}

impl ShaderFile {
    pub const PRAGMA_ONCE: &'static str = "#pragma once";
    pub const INCLUDE: &'static str = "#include";

    pub fn parse(path: &Path, source: &str) -> Result<Self, ShaderError> {
        let mut pragma_once = false;
        let mut lines = Vec::new();
        let mut includes = Vec::new();

        for (number, line) in source.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed == Self::PRAGMA_ONCE {
                pragma_once = true;
                lines.push(String::new());
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix(Self::INCLUDE) {
                let include = Self::include_path(rest).ok_or_else(|| {
                    ShaderError::ExpectedPathAfterInclude(path.to_path_buf(), number + 1)
                })?;

                includes.push(ShaderInclude {
                    path: include,
                    line: lines.len(),
                });
                lines.push(String::new());
                continue;
            }

            lines.push(line.to_string());
        }

        Ok(Self {
            pragma_once,
            path: path.to_path_buf(),
            lines,
            includes,
        })
    }

    fn include_path(rest: &str) -> Option<PathBuf> {
        let rest = rest.trim().strip_prefix('"')?;
        let end = rest.find('"')?;

        if end == 0 {
            return None;
        }

        Some(PathBuf::from(&rest[..end]))
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

#[derive(Debug)]
pub struct ShaderProcessor {
    pub source: ShaderSource,
    files: HashMap<PathBuf, ShaderFile>,
}

impl ShaderProcessor {
    pub fn new(source: ShaderSource) -> Self {
        Self {
            source,
            files: HashMap::new(),
        }
    }

    fn open(&mut self, path: &Path) -> Result<ShaderFile, ShaderError> {
        if let Some(file) = self.files.get(path) {
            return Ok(file.clone());
        }

        let source = self.source.read(path)?;
        let file = ShaderFile::parse(path, &source)?;
        self.files.insert(path.to_path_buf(), file.clone());

        Ok(file)
    }

    fn expand(
        &mut self,
        file: &ShaderFile,
        included: &mut Vec<PathBuf>,
        stack: &mut Vec<PathBuf>,
        out: &mut String,
    ) -> Result<(), ShaderError> {
        let mut includes = file.includes.iter().peekable();

        for (index, line) in file.lines.iter().enumerate() {
            let Some(include) = includes.next_if(|include| include.line == index) else {
                out.push_str(line);
                out.push('\n');
                continue;
            };

            let path = file.parent().join(&include.path);
            let child = self.open(&path)?;

            if child.pragma_once && included.contains(&path) {
                continue;
            }

            if stack.contains(&path) {
                return Err(ShaderError::RecursiveInclude(path));
            }

            included.push(path.clone());
            stack.push(path);
            self.expand(&child, included, stack, out)?;
            stack.pop();
        }

        Ok(())
    }

    pub fn process(&mut self, path: impl AsRef<Path>) -> Result<String, ShaderError> {
        let path = path.as_ref();
        let file = self.open(path)?;

        let mut out = String::new();
        let mut included = vec![path.to_path_buf()];
        let mut stack = vec![path.to_path_buf()];
        self.expand(&file, &mut included, &mut stack, &mut out)?;

        Ok(out)
    }
}

pub fn open_shader(
    device: &wgpu::Device,
    path: impl AsRef<Path>,
) -> Result<wgpu::ShaderModule, ShaderError> {
    static PROCESSOR: Mutex<Option<ShaderProcessor>> = Mutex::new(None);

    let path = path.as_ref();
    let source = {
        let mut processor = PROCESSOR.lock().map_err(|_| ShaderError::Poisoned)?;
        let processor =
            processor.get_or_insert_with(|| ShaderProcessor::new(ShaderSource::default_source()));
        processor.process(path)?
    };

    debug!("Compiling shader {}", path.display());

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("Shader: {}", path.display())),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("Shader file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Expected quoted path after #include directive in {0}:{1}")]
    ExpectedPathAfterInclude(PathBuf, usize),
    #[error("Shader includes itself: {0}")]
    RecursiveInclude(PathBuf),
    #[error("Shader processor lock poisoned")]
    Poisoned,
    #[error("Failed to read shader: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILES: &[(&str, &str)] = &[
        ("shaders/common.wgsl", "#pragma once\nconst PI: f32 = 3.14;\n"),
        (
            "shaders/main.wgsl",
            "#include \"common.wgsl\"\n#include \"common.wgsl\"\nfn main() {}\n",
        ),
        ("shaders/loop.wgsl", "#include \"loop.wgsl\"\n"),
        ("shaders/bad.wgsl", "#include common.wgsl\n"),
        ("shaders/nested.wgsl", "#include \"main.wgsl\"\nfn other() {}\n"),
    ];

    fn processor() -> ShaderProcessor {
        ShaderProcessor::new(ShaderSource::Embedded(FILES))
    }

    #[test]
    fn pragma_once_included_once() {
        let source = processor().process("shaders/main.wgsl").unwrap();

        assert_eq!(source.matches("const PI").count(), 1);
        assert!(source.contains("fn main() {}"));
        assert!(!source.contains("#include"));
        assert!(!source.contains("#pragma"));
    }

    #[test]
    fn nested_includes() {
        let source = processor().process("shaders/nested.wgsl").unwrap();

        assert_eq!(source.matches("const PI").count(), 1);
        assert!(source.find("fn main").unwrap() < source.find("fn other").unwrap());
    }

    #[test]
    fn recursive_include_is_an_error() {
        let result = processor().process("shaders/loop.wgsl");
        assert!(matches!(result, Err(ShaderError::RecursiveInclude(_))));
    }

    #[test]
    fn unquoted_include_is_an_error() {
        let result = processor().process("shaders/bad.wgsl");
        assert!(matches!(
            result,
            Err(ShaderError::ExpectedPathAfterInclude(_, 1))
        ));
    }

    #[test]
    fn missing_file() {
        let result = processor().process("shaders/none.wgsl");
        assert!(matches!(result, Err(ShaderError::FileNotFound(_))));
    }

    #[cfg(feature = "embedded-assets")]
    #[test]
    fn embedded_shaders_expand() {
        let mut processor = ShaderProcessor::new(ShaderSource::default_source());

        for (path, _) in EMBEDDED_SHADERS {
            let source = processor.process(path).unwrap();
            assert!(!source.contains("#include"));
        }
    }
}
