//! Local contrast enhancement for grayscale document photos.

use image::{GrayImage, Luma};

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `tiles` x `tiles` regions, each with its own
/// clipped equalization curve; pixels are mapped by bilinear interpolation
/// between the four nearest tile curves.
pub fn clahe(image: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(width), (y0 + tile_h).min(height));

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&mut hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut = |tx: u32, ty: u32, value: u8| luts[(ty * tiles_x + tx) as usize][value as usize] as f32;

    let mut result = GrayImage::new(width, height);
    for y in 0..height {
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = (gy.floor().max(0.0) as u32).min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);

        for x in 0..width {
            let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = (gx.floor().max(0.0) as u32).min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let fx = (gx - tx0 as f32).clamp(0.0, 1.0);

            let v = image.get_pixel(x, y)[0];
            let top = lut(tx0, ty0, v) * (1.0 - fx) + lut(tx1, ty0, v) * fx;
            let bottom = lut(tx0, ty1, v) * (1.0 - fx) + lut(tx1, ty1, v) * fx;
            let mapped = top * (1.0 - fy) + bottom * fy;

            result.put_pixel(x, y, Luma([mapped.round().clamp(0.0, 255.0) as u8]));
        }
    }

    result
}

fn tile_lut(hist: &mut [u32; 256], count: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if count == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let limit = (clip_limit * count as f32 / 256.0).max(1.0) as u32;
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let bonus = excess / 256;
    let remainder = excess % 256;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from((i as u32) < remainder);
    }

    let mut cdf = 0u64;
    for (i, bin) in hist.iter().enumerate() {
        cdf += *bin as u64;
        lut[i] = ((cdf * 255) / count as u64).min(255) as u8;
    }
    lut
}
