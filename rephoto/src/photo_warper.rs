use crate::homography::Homography;
use crate::photo::{Photo, BYTES_PER_PIXEL};
use rayon::prelude::*;

/// Colour written wherever the transform samples outside the source photo.
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Resamples `source` through `homography` into a new photo of
/// `dest_width` × `dest_height` (the source extent when `None`).
///
/// For every destination pixel `(x, y)` the source position is
///
/// ```text
///   k = x * h6 + y * h7 + 1
///   u = (x * h0 + y * h1 + h2) / k
///   v = (x * h3 + y * h4 + h5) / k
/// ```
///
/// truncated to integers (nearest-neighbour, no interpolation). Positions
/// outside the source, or where `k` vanishes, produce [`TRANSPARENT`]. Rows
/// are computed in parallel; every pixel depends only on its own coordinates.
///
/// # Examples
/// ```
/// # use rephoto::homography::Homography;
/// # use rephoto::photo::Photo;
/// # use rephoto::photo_warper::warp_photo;
/// let photo = Photo::filled(3, 2, [9, 8, 7, 255]);
/// assert_eq!(warp_photo(&Homography::identity(), &photo, None), photo);
/// ```
pub fn warp_photo(homography: &Homography, source: &Photo, dest_size: Option<(usize, usize)>) -> Photo {
    let (dest_width, dest_height) = dest_size.unwrap_or((source.width, source.height));
    let mut dest = Photo::new(dest_width, dest_height);
    if dest.is_empty() {
        return dest;
    }
    let h = homography.coefficients;
    let row_len = dest_width * BYTES_PER_PIXEL;

    dest.img_data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row_out)| {
            let y = y as f64;
            for x in 0..dest_width {
                let xf = x as f64;
                let pixel = sample(source, &h, xf, y).unwrap_or(TRANSPARENT);
                row_out[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL].copy_from_slice(&pixel);
            }
        });

    dest
}

#[inline]
fn sample(source: &Photo, h: &[f64; 8], x: f64, y: f64) -> Option<[u8; 4]> {
    let k = x * h[6] + y * h[7] + 1.0;
    if k == 0.0 {
        return None;
    }
    let u = (x * h[0] + y * h[1] + h[2]) / k;
    let v = (x * h[3] + y * h[4] + h[5]) / k;
    // NaN fails both comparisons and is rejected here too
    if !(u >= 0.0 && v >= 0.0) || u >= source.width as f64 || v >= source.height as f64 {
        return None;
    }
    source.get_rgba(u as usize, v as usize)
}
