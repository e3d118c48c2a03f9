use crate::dimension::Dimension;
use rayon::prelude::*;

/// Number of bytes per pixel: R, G, B and A.
pub const BYTES_PER_PIXEL: usize = 4;

/// A basic representation of an image with RGBA pixel data.
/// Each pixel occupies 4 bytes: R, G, B, and A (alpha), rows stored top to bottom.
#[derive(Clone, PartialEq, Eq)]
pub struct Photo {
    /// Pixel data stored in a 1D `Vec<u8>`, in RGBA format (4 bytes per pixel).
    pub img_data: Vec<u8>,
    /// The width (in pixels) of the image.
    pub width: usize,
    /// The height (in pixels) of the image.
    pub height: usize,
}

impl Default for Photo {
    /// Creates an empty `Photo` with zero width and height, and no image data.
    fn default() -> Photo {
        Photo {
            img_data: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Photo {
    /// Creates a fully transparent photo of the given size.
    pub fn new(width: usize, height: usize) -> Photo {
        Photo {
            img_data: vec![0u8; width * height * BYTES_PER_PIXEL],
            width,
            height,
        }
    }

    /// Wraps an existing RGBA buffer.
    ///
    /// # Returns
    /// `None` if `img_data` does not hold exactly `width * height * 4` bytes.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::photo::Photo;
    /// assert!(Photo::from_rgba(2, 1, vec![0; 8]).is_some());
    /// assert!(Photo::from_rgba(2, 2, vec![0; 8]).is_none());
    /// ```
    pub fn from_rgba(width: usize, height: usize, img_data: Vec<u8>) -> Option<Photo> {
        if img_data.len() != width * height * BYTES_PER_PIXEL {
            return None;
        }
        Some(Photo {
            img_data,
            width,
            height,
        })
    }

    /// Creates a photo where every pixel has the colour `rgba`.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Photo {
        let mut img_data = Vec::with_capacity(width * height * BYTES_PER_PIXEL);
        for _ in 0..width * height {
            img_data.extend_from_slice(&rgba);
        }
        Photo {
            img_data,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The photo extent as a [`Dimension`] anchored at the origin.
    pub fn dimension(&self) -> Dimension {
        Dimension::sized(self.width as u32, self.height as u32)
    }

    /// Returns the RGBA components at `(x, y)`, or `None` when out of bounds.
    pub fn get_rgba(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y * self.width + x) * BYTES_PER_PIXEL;
        let px = &self.img_data[index..index + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Writes `rgba` at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set_rgba(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y * self.width + x) * BYTES_PER_PIXEL;
        self.img_data[index..index + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Produces a new `Photo` resampled to exactly `new_width` × `new_height`.
    ///
    /// Along an axis that shrinks, each new pixel is the average of every
    /// original pixel in the block that maps onto it (area-based downsample).
    /// Along an axis that grows or keeps its size, each new pixel copies the
    /// original pixel under its centre, so resampling to the same size is an
    /// exact copy.
    ///
    /// # Examples
    /// ```
    /// # use rephoto::photo::Photo;
    /// let mut photo = Photo::new(2, 1);
    /// photo.set_rgba(0, 0, [0, 0, 0, 255]);
    /// photo.set_rgba(1, 0, [200, 100, 50, 255]);
    /// let half = photo.get_scaled(1, 1);
    /// assert_eq!(half.get_rgba(0, 0), Some([100, 50, 25, 255]));
    /// ```
    pub fn get_scaled(&self, new_width: usize, new_height: usize) -> Photo {
        if self.is_empty() || new_width == 0 || new_height == 0 {
            return Photo::new(new_width, new_height);
        }

        let x_ranges = axis_ranges(self.width, new_width);
        let y_ranges = axis_ranges(self.height, new_height);
        let mut scaled = Photo::new(new_width, new_height);
        let row_len = new_width * BYTES_PER_PIXEL;

        scaled
            .img_data
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(new_y, row_out)| {
                let (y_start, y_end) = y_ranges[new_y];
                for (new_x, &(x_start, x_end)) in x_ranges.iter().enumerate() {
                    // Accumulators for RGBA values, plus a pixel count
                    let mut totals = [0u32; 4];
                    let mut pixel_count: u32 = 0;
                    for orig_y in y_start..y_end {
                        let row = orig_y * self.width;
                        for orig_x in x_start..x_end {
                            let orig_index = (row + orig_x) * BYTES_PER_PIXEL;
                            for c in 0..BYTES_PER_PIXEL {
                                totals[c] += self.img_data[orig_index + c] as u32;
                            }
                            pixel_count += 1;
                        }
                    }
                    let out = &mut row_out[new_x * BYTES_PER_PIXEL..(new_x + 1) * BYTES_PER_PIXEL];
                    for c in 0..BYTES_PER_PIXEL {
                        out[c] = (totals[c] / pixel_count) as u8;
                    }
                }
            });

        scaled
    }

    /// Copies the pixels inside `region` into a new `Photo`.
    ///
    /// The region is clipped to the photo bounds first; a region that does not
    /// overlap the photo yields an empty photo. The receiver is never modified.
    pub fn crop(&self, region: Dimension) -> Photo {
        let clipped = region.intersect(&self.dimension());
        if clipped.is_empty() {
            return Photo::default();
        }
        let (x0, y0) = (clipped.x as usize, clipped.y as usize);
        let (w, h) = (clipped.w as usize, clipped.h as usize);
        let mut img_data = Vec::with_capacity(w * h * BYTES_PER_PIXEL);
        for y in y0..y0 + h {
            let start = (y * self.width + x0) * BYTES_PER_PIXEL;
            img_data.extend_from_slice(&self.img_data[start..start + w * BYTES_PER_PIXEL]);
        }
        Photo {
            img_data,
            width: w,
            height: h,
        }
    }
}

/// For each output index along one axis, the half-open range of input
/// indices that contributes to it.
fn axis_ranges(old_len: usize, new_len: usize) -> Vec<(usize, usize)> {
    let scale = old_len as f64 / new_len as f64;
    (0..new_len)
        .map(|i| {
            if scale <= 1.0 {
                let center = (((i as f64 + 0.5) * scale).floor() as usize).min(old_len - 1);
                (center, center + 1)
            } else {
                let start = ((i as f64 * scale).floor() as usize).min(old_len - 1);
                let end = (((i + 1) as f64 * scale).ceil() as usize).clamp(start + 1, old_len);
                (start, end)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Photo {
        let mut photo = Photo::new(width, height);
        for y in 0..height {
            for x in 0..width {
                photo.set_rgba(x, y, [(x * 10) as u8, (y * 10) as u8, 7, 255]);
            }
        }
        photo
    }

    #[test]
    fn same_size_scale_is_exact_copy() {
        let photo = gradient(7, 5);
        assert_eq!(photo.get_scaled(7, 5), photo);
    }

    #[test]
    fn downsample_averages_blocks() {
        let photo = gradient(4, 4);
        let scaled = photo.get_scaled(2, 2);
        // block x in {0,1}, y in {0,1} -> mean r = 5, g = 5
        assert_eq!(scaled.get_rgba(0, 0), Some([5, 5, 7, 255]));
        assert_eq!(scaled.get_rgba(1, 1), Some([25, 25, 7, 255]));
    }

    #[test]
    fn upsample_replicates_pixels() {
        let photo = gradient(2, 1);
        let scaled = photo.get_scaled(4, 2);
        assert_eq!(scaled.get_rgba(0, 0), Some([0, 0, 7, 255]));
        assert_eq!(scaled.get_rgba(1, 1), Some([0, 0, 7, 255]));
        assert_eq!(scaled.get_rgba(2, 0), Some([10, 0, 7, 255]));
        assert_eq!(scaled.get_rgba(3, 1), Some([10, 0, 7, 255]));
    }

    #[test]
    fn crop_copies_region_without_touching_source() {
        let photo = gradient(10, 10);
        let before = photo.clone();
        let cropped = photo.crop(Dimension::new(2, 3, 4, 2));
        assert_eq!((cropped.width, cropped.height), (4, 2));
        assert_eq!(cropped.get_rgba(0, 0), photo.get_rgba(2, 3));
        assert_eq!(cropped.get_rgba(3, 1), photo.get_rgba(5, 4));
        assert_eq!(photo, before);
    }

    #[test]
    fn crop_is_clipped_to_bounds() {
        let photo = gradient(10, 10);
        let cropped = photo.crop(Dimension::new(8, -2, 5, 5));
        assert_eq!((cropped.width, cropped.height), (2, 3));
        assert!(photo.crop(Dimension::new(20, 20, 5, 5)).is_empty());
    }

    #[test]
    fn out_of_bounds_access_is_defined() {
        let mut photo = gradient(3, 3);
        assert_eq!(photo.get_rgba(3, 0), None);
        photo.set_rgba(5, 5, [1, 2, 3, 4]);
        assert_eq!(photo, gradient(3, 3));
    }
}
