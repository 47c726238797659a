//! Assembles the boot disk image: boot code, kernel header, kernel, zero
//! padding up to [`IMAGE_SIZE`].

use clap::Parser;
use image_abi::{HEADER_LEN, IMAGE_SIZE, KernelHeader};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "mkimage", about = "Build the bootable disk image")]
pub struct Args {
    /// Boot sector binary.
    #[arg(long, value_name = "BIN", default_value = ".out/boot.bin")]
    pub boot: PathBuf,
    /// Flat kernel binary.
    #[arg(long, value_name = "BIN", default_value = ".out/kernel.bin")]
    pub kernel: PathBuf,
    /// Output image path.
    #[arg(short, long, value_name = "IMG", default_value = ".out/alvm.iso")]
    pub output: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("kernel of {len} bytes needs more than {max} sectors", max = u16::MAX)]
    KernelTooLarge { len: usize },
    #[error("{len} bytes of content do not fit a {size} byte image", size = IMAGE_SIZE)]
    ImageOverflow { len: usize },
}

/// Lay out `boot` and `kernel` in a zero-padded image.
///
/// # Errors
/// [`ImageError::KernelTooLarge`] if the sector count overflows the header,
/// [`ImageError::ImageOverflow`] if the content exceeds [`IMAGE_SIZE`].
pub fn build_image(boot: &[u8], kernel: &[u8]) -> Result<Vec<u8>, ImageError> {
    let header = kernel_header(kernel)?;

    let len = boot.len() + HEADER_LEN + kernel.len();
    if len > IMAGE_SIZE {
        return Err(ImageError::ImageOverflow { len });
    }

    let mut image = Vec::with_capacity(IMAGE_SIZE);
    image.extend_from_slice(boot);
    image.extend_from_slice(&header.encode());
    image.extend_from_slice(kernel);
    image.resize(IMAGE_SIZE, 0);
    Ok(image)
}

/// The header announcing `kernel` to the loader.
///
/// # Errors
/// [`ImageError::KernelTooLarge`] if the sector count overflows the header.
pub fn kernel_header(kernel: &[u8]) -> Result<KernelHeader, ImageError> {
    KernelHeader::for_kernel(kernel.len()).ok_or(ImageError::KernelTooLarge { len: kernel.len() })
}

/// Read the inputs named in `args` and write the image.
///
/// # Errors
/// I/O failures name the offending path; layout failures as in [`build_image`].
pub fn run(args: &Args) -> Result<KernelHeader, ImageError> {
    let boot = read(&args.boot)?;
    let kernel = read(&args.kernel)?;
    let header = kernel_header(&kernel)?;
    let image = build_image(&boot, &kernel)?;

    if let Some(dir) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    }
    fs::write(&args.output, &image).map_err(|source| io_error(&args.output, source))?;
    Ok(header)
}

fn read(path: &Path) -> Result<Vec<u8>, ImageError> {
    fs::read(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ImageError {
    ImageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_build_layout() {
        let args = Args::try_parse_from(["mkimage"]).unwrap();
        assert_eq!(args.boot, PathBuf::from(".out/boot.bin"));
        assert_eq!(args.kernel, PathBuf::from(".out/kernel.bin"));
        assert_eq!(args.output, PathBuf::from(".out/alvm.iso"));
    }

    #[test]
    fn paths_can_be_overridden() {
        let argv = ["mkimage", "--boot", "b", "--kernel", "k", "-o", "x.img"];
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.boot, PathBuf::from("b"));
        assert_eq!(args.kernel, PathBuf::from("k"));
        assert_eq!(args.output, PathBuf::from("x.img"));
    }
}
