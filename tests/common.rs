use anyhow::{bail, Result};
use image::{ImageBuffer, Rgb};
use optimg::prelude::*;
use rand::Rng;
use std::{
    cell::Cell,
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

#[allow(dead_code)]
static SETUP: Once = Once::new();

#[allow(dead_code)]
pub const TEST_IMAGE: &str = "tests/assets/test_image.jpg";

#[allow(dead_code)]
fn generate_test_image(path: &Path) {
    let img_width = 160;
    let img_height = 120;
    let img = ImageBuffer::from_fn(img_width, img_height, |x, y| {
        Rgb([(x * 255 / img_width) as u8, (y * 255 / img_height) as u8, 128u8])
    });
    img.save(path).unwrap();
}

/// Generates the shared JPEG fixture once per test binary.
#[allow(dead_code)]
pub fn setup() {
    SETUP.call_once(|| {
        let assets_dir = Path::new("tests/assets");
        if !assets_dir.exists() {
            fs::create_dir_all(assets_dir).unwrap();
        }

        let image_path = Path::new(TEST_IMAGE);
        if !image_path.exists() {
            generate_test_image(image_path);
        }
    });
}

/// Writes `len` random bytes to `path`, creating parent directories.
#[allow(dead_code)]
pub fn write_random(path: &Path, len: usize) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    fs::write(path, &data).unwrap();
    path.to_path_buf()
}

/// Compressor returning a fixed number of bytes, counting its calls.
#[allow(dead_code)]
pub struct FixedCompressor {
    pub output_len: usize,
    pub calls: Cell<usize>,
}

#[allow(dead_code)]
impl FixedCompressor {
    pub fn new(output_len: usize) -> Self {
        Self {
            output_len,
            calls: Cell::new(0),
        }
    }
}

impl Compressor for FixedCompressor {
    fn compress(&self, _path: &Path) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![0xAB; self.output_len])
    }

    fn describe(&self) -> String {
        format!("fixed ({} bytes)", self.output_len)
    }
}

/// Compressor that always fails.
#[allow(dead_code)]
pub struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, path: &Path) -> Result<Vec<u8>> {
        bail!("cannot compress {}", path.display())
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// External compressor running `script` through `/bin/sh`, image path as `$1`.
#[allow(dead_code)]
pub fn shell_kind(script: &str) -> CompressorKind {
    let template = CompressorTemplate::parse(&format!("-c '{}' sh {{image}}", script)).unwrap();
    CompressorKind::External {
        program: PathBuf::from("/bin/sh"),
        template,
    }
}

/// Current process uid and gid.
#[allow(dead_code)]
pub fn current_ids() -> (u32, u32) {
    unsafe { (libc::getuid(), libc::getgid()) }
}
