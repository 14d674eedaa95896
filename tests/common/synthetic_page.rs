use image::{Rgb, RgbImage};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const STAMP_BLUE: Rgb<u8> = Rgb([20, 40, 230]);
pub const INK_BLACK: Rgb<u8> = Rgb([10, 10, 10]);

/// A blank white page.
pub fn blank_page(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, WHITE)
}

/// Paints a filled `w` x `h` rectangle with its top-left corner at (`x`, `y`).
pub fn fill_rect(page: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for yy in y..(y + h).min(page.height()) {
        for xx in x..(x + w).min(page.width()) {
            page.put_pixel(xx, yy, color);
        }
    }
}

/// A 1000x1000 page with one blue stamp block and some black "text" lines.
pub fn page_with_stamp(x: u32, y: u32, w: u32, h: u32) -> RgbImage {
    let mut page = blank_page(1000, 1000);
    for line in 0..8 {
        fill_rect(&mut page, 80, 600 + line * 30, 700, 6, INK_BLACK);
    }
    fill_rect(&mut page, x, y, w, h, STAMP_BLUE);
    page
}
