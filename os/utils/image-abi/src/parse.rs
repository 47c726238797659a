use crate::{HEADER_LEN, IMAGE_MAGIC, KernelHeader};

/// Why an image could not be read back.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HeaderError {
    /// No [`IMAGE_MAGIC`] after the boot code.
    MissingMagic,
    /// The image ends inside the header or the kernel.
    OutOfBounds,
}

#[inline]
fn read_u16_le(buf: &[u8], off: usize) -> Result<u16, HeaderError> {
    let end = off.checked_add(2).ok_or(HeaderError::OutOfBounds)?;
    let s = buf.get(off..end).ok_or(HeaderError::OutOfBounds)?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

/// View over an assembled image, given where the boot code ends.
#[derive(Debug)]
pub struct ImageView<'a> {
    image: &'a [u8],
    kernel_offset: usize,
    header: KernelHeader,
}

impl<'a> ImageView<'a> {
    /// Read the kernel header at `boot_len`.
    ///
    /// # Errors
    /// [`HeaderError::MissingMagic`] if the magic is absent,
    /// [`HeaderError::OutOfBounds`] if the image is truncated.
    pub fn parse(image: &'a [u8], boot_len: usize) -> Result<Self, HeaderError> {
        let magic_end = boot_len
            .checked_add(IMAGE_MAGIC.len())
            .ok_or(HeaderError::OutOfBounds)?;
        let magic = image
            .get(boot_len..magic_end)
            .ok_or(HeaderError::OutOfBounds)?;
        if magic != IMAGE_MAGIC {
            return Err(HeaderError::MissingMagic);
        }

        let kernel_sectors = read_u16_le(image, magic_end)?;
        let header = KernelHeader { kernel_sectors };
        let kernel_offset = boot_len + HEADER_LEN;
        if kernel_offset + header.kernel_bytes() > image.len() {
            return Err(HeaderError::OutOfBounds);
        }

        Ok(Self {
            image,
            kernel_offset,
            header,
        })
    }

    #[must_use]
    pub const fn header(&self) -> KernelHeader {
        self.header
    }

    /// The sectors the loader reads for the kernel, padding included.
    #[must_use]
    pub fn kernel_sectors(&self) -> &'a [u8] {
        &self.image[self.kernel_offset..self.kernel_offset + self.header.kernel_bytes()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SECTOR_SIZE;

    #[test]
    fn parse_finds_the_kernel() {
        let mut image = vec![0u8; 4096];
        image[..3].copy_from_slice(b"MBR");
        image[3..7].copy_from_slice(&KernelHeader { kernel_sectors: 2 }.encode());
        image[7..10].copy_from_slice(b"KRN");

        let view = ImageView::parse(&image, 3).unwrap();
        assert_eq!(view.header().kernel_sectors, 2);
        assert_eq!(view.kernel_sectors().len(), 2 * SECTOR_SIZE);
        assert_eq!(&view.kernel_sectors()[..3], b"KRN");
    }

    #[test]
    fn parse_rejects_bad_images() {
        let image = [b'X', b'A', b'X', 0, 0];
        assert_eq!(ImageView::parse(&image, 1).unwrap_err(), HeaderError::MissingMagic);
        assert_eq!(ImageView::parse(&image, 4).unwrap_err(), HeaderError::OutOfBounds);

        let truncated = [b'A', b'L', 1, 0, 0xAA];
        assert_eq!(ImageView::parse(&truncated, 0).unwrap_err(), HeaderError::OutOfBounds);
    }
}
