//! This module provides the compressors that produce replacement JPEG bytes.
//!
//! A compressor reads an image and returns the complete recompressed payload
//! in memory. It never touches the source file; deciding whether the payload
//! is worth keeping, and writing it, is the optimizer's job.
//!
//! - [`MozjpegCompressor`] decodes and re-encodes inside this process.
//! - [`ExternalCompressor`] runs a configured program and captures its
//!   standard output.

use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use mozjpeg::{ColorSpace, Compress, Decompress, Marker, ALL_MARKERS};

use crate::{
    config::CompressorKind,
    error::OptimizeError,
    template::CompressorTemplate,
};

/// Turns an image file into candidate replacement bytes.
pub trait Compressor {
    /// Returns the whole recompressed payload, or why it could not be made.
    fn compress(&self, path: &Path) -> Result<Vec<u8>>;

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Builds the compressor selected by the configuration.
///
/// An external program that does not exist is a fatal configuration error.
pub fn from_kind(kind: &CompressorKind) -> Result<Box<dyn Compressor>, OptimizeError> {
    match kind {
        CompressorKind::InProcess { quality } => Ok(Box::new(MozjpegCompressor::new(*quality))),
        CompressorKind::External { program, template } => Ok(Box::new(ExternalCompressor::new(
            program.clone(),
            template.clone(),
        )?)),
    }
}

/// Re-encodes JPEGs with mozjpeg.
#[derive(Debug, Clone)]
pub struct MozjpegCompressor {
    quality: f32,
}

impl MozjpegCompressor {
    pub fn new(quality: f32) -> Self {
        Self { quality }
    }

    fn recompress(&self, file_data: &[u8]) -> Result<Vec<u8>> {
        let decompress = Decompress::with_markers(ALL_MARKERS).from_mem(file_data)?;
        let markers: Vec<(Marker, Vec<u8>)> = decompress
            .markers()
            .filter(|m| is_carried_over(m.marker))
            .map(|m| (m.marker, m.data.to_vec()))
            .collect();
        let mut image = decompress
            .rgb()
            .with_context(|| "Failed to decompress to RGB")?;
        let (width, height) = (image.width(), image.height());
        let pixels = image.read_scanlines::<rgb::RGB8>()?;

        let mut compress = Compress::new(ColorSpace::JCS_RGB);
        compress.set_quality(self.quality);
        compress.set_size(width, height);
        compress.set_optimize_coding(true);

        let mut comp = compress
            .start_compress(Vec::new())
            .with_context(|| "Failed to start compression")?;
        for (marker, data) in &markers {
            comp.write_marker(*marker, data);
        }
        comp.write_scanlines(rgb::ComponentBytes::as_bytes(pixels.as_slice()))
            .with_context(|| "Failed to write scanlines")?;
        let compressed_data = comp.finish()?;
        Ok(compressed_data)
    }
}

/// Metadata segments copied into the re-encoded image: Exif, ICC, XMP,
/// IPTC and comments. APP0 (JFIF) and APP14 (Adobe) describe the encoding
/// itself and are written fresh by the encoder.
fn is_carried_over(marker: Marker) -> bool {
    match marker {
        Marker::APP(n) => n != 0 && n != 14,
        Marker::COM => true,
    }
}

impl Compressor for MozjpegCompressor {
    fn compress(&self, path: &Path) -> Result<Vec<u8>> {
        let file_data =
            fs::read(path).with_context(|| format!("Failed to read image file: {:?}", path))?;

        // libjpeg errors unwind out of the codec
        let output = panic::catch_unwind(AssertUnwindSafe(|| self.recompress(&file_data)))
            .map_err(|payload| {
                let reason = payload
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| payload.downcast_ref::<&str>().copied())
                    .unwrap_or("codec panicked");
                anyhow::anyhow!("{}", reason)
            })??;

        if output.is_empty() {
            bail!("encoder produced no output");
        }
        Ok(output)
    }

    fn describe(&self) -> String {
        format!("internal mozjpeg (quality {})", self.quality)
    }
}

/// Runs an external program whose standard output is the recompressed image.
#[derive(Debug, Clone)]
pub struct ExternalCompressor {
    program: PathBuf,
    template: CompressorTemplate,
}

impl ExternalCompressor {
    /// Fails with [`OptimizeError::CompressorNotFound`] if `program` does not
    /// exist.
    pub fn new(program: PathBuf, template: CompressorTemplate) -> Result<Self, OptimizeError> {
        if !program.exists() {
            return Err(OptimizeError::CompressorNotFound(program));
        }
        Ok(Self { program, template })
    }
}

impl Compressor for ExternalCompressor {
    fn compress(&self, path: &Path) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(self.template.render(path))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("{} exited with {}", self.program.display(), output.status);
            }
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr
            );
        }
        if output.stdout.is_empty() {
            bail!("{} produced no output", self.program.display());
        }
        Ok(output.stdout)
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program.display(), self.template)
    }
}
