use image::GrayImage;

use crate::error::ScanError;

/// One luminance frame as delivered by the camera collaborator.
///
/// The buffer may carry row padding and interleaved planes, so `row_stride`
/// and `pixel_stride` describe the layout rather than assuming packed bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            row_stride: width as usize,
            pixel_stride: 1,
        }
    }

    pub fn with_strides(
        width: u32,
        height: u32,
        data: Vec<u8>,
        row_stride: usize,
        pixel_stride: usize,
    ) -> Self {
        Self {
            width,
            height,
            data,
            row_stride,
            pixel_stride,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.row_stride
            + (self.width as usize - 1) * self.pixel_stride
            + 1
    }

    /// Repack the strided luminance buffer into a tightly packed grayscale
    /// image. Zero dimensions or an undersized buffer are rejected.
    pub fn to_gray(&self) -> Result<GrayImage, ScanError> {
        if self.width == 0 || self.height == 0 || self.data.len() < self.required_len() {
            return Err(ScanError::InvalidFrame {
                width: self.width,
                height: self.height,
                len: self.data.len(),
            });
        }

        if self.pixel_stride == 1 && self.row_stride == self.width as usize {
            let packed = self.data[..self.pixel_count()].to_vec();
            // Length just checked, from_raw cannot fail here.
            return Ok(GrayImage::from_raw(self.width, self.height, packed)
                .unwrap_or_else(|| GrayImage::new(self.width, self.height)));
        }

        let mut packed = Vec::with_capacity(self.pixel_count());
        for row in 0..self.height as usize {
            let row_start = row * self.row_stride;
            for col in 0..self.width as usize {
                packed.push(self.data[row_start + col * self.pixel_stride]);
            }
        }
        Ok(GrayImage::from_raw(self.width, self.height, packed)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height)))
    }
}

/// A frame after orientation correction and cropping, together with its
/// flattened bytes. The bytes feed both histogram generation and
/// binarization, so they are extracted once here.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub image: GrayImage,
    pub bytes: Vec<u8>,
}

impl ProcessedFrame {
    pub fn new(image: GrayImage) -> Self {
        let bytes = image.as_raw().clone();
        Self { image, bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_frame_to_gray() {
        let frame = RawFrame::new(4, 3, (0u8..12).collect());
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.width(), 4);
        assert_eq!(gray.height(), 3);
        assert_eq!(gray.get_pixel(1, 2).0[0], 9);
    }

    #[test]
    fn test_strided_frame_to_gray() {
        // 3x2 image, row stride 8, pixel stride 2
        let mut data = vec![0u8; 2 * 8];
        for row in 0..2 {
            for col in 0..3 {
                data[row * 8 + col * 2] = (row * 10 + col) as u8;
            }
        }
        let frame = RawFrame::with_strides(3, 2, data, 8, 2);
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.get_pixel(2, 1).0[0], 12);
    }

    #[test]
    fn test_empty_frame_rejected() {
        let frame = RawFrame::new(0, 0, vec![]);
        assert!(matches!(
            frame.to_gray(),
            Err(ScanError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let frame = RawFrame::new(10, 10, vec![0u8; 50]);
        assert!(frame.to_gray().is_err());
    }

    #[test]
    fn test_processed_frame_bytes_match_image() {
        let image = GrayImage::from_raw(2, 2, vec![1, 2, 3, 4]).unwrap();
        let processed = ProcessedFrame::new(image);
        assert_eq!(processed.bytes, vec![1, 2, 3, 4]);
    }
}
