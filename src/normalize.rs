use image::{DynamicImage, GrayImage, Luma};

/// Intensity split between ink and paper once contrast has been stretched.
const THRESHOLD: u8 = 128;

/// Decodes an uploaded sheet and reduces it to a two-level bitmap for OCR.
pub fn normalize_bytes(bytes: &[u8]) -> Result<GrayImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(normalize(&decoded))
}

/// Grayscale, stretch contrast to the full 0-255 range, then binarize at the
/// midpoint. Pixels at or above the midpoint become white.
pub fn normalize(img: &DynamicImage) -> GrayImage {
    let mut gray = img.to_luma8();
    stretch_contrast(&mut gray);
    binarize(&gray, THRESHOLD)
}

fn stretch_contrast(img: &mut GrayImage) {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    // Flat (or empty) images have nothing to stretch.
    if max <= min {
        return;
    }

    let range = (max - min) as u32;
    for pixel in img.pixels_mut() {
        let value = (pixel[0] - min) as u32 * 255 / range;
        pixel[0] = value as u8;
    }
}

fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] >= threshold { 255u8 } else { 0u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn low_contrast_scan_is_stretched_before_threshold() {
        // A washed-out scan: everything between 100 and 140.
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 13]));
        let result = normalize(&DynamicImage::ImageLuma8(img));

        let values: Vec<u8> = result.pixels().map(|p| p[0]).collect();
        assert_eq!(values, [0, 0, 255, 255]);
    }

    #[test]
    fn output_has_only_two_levels() {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 90]));
        let result = normalize(&DynamicImage::ImageRgb8(img));

        assert_eq!(result.dimensions(), (16, 16));
        assert!(result.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn flat_image_is_left_unstretched() {
        let img = GrayImage::from_pixel(3, 3, Luma([90]));
        let result = normalize(&DynamicImage::ImageLuma8(img));
        assert!(result.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn decodes_encoded_png() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 10 } else { 200 }]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let result = normalize_bytes(&bytes).unwrap();
        assert_eq!(result.get_pixel(0, 0)[0], 0);
        assert_eq!(result.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(normalize_bytes(b"definitely not an image").is_err());
    }
}
