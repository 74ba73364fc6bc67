// Splits images larger than one atlas layer into layer-sized tiles.

use crate::textures::types::{Size, TexelRect};

pub fn needs_tiling(size: Size<u32>, max_size: u32) -> bool {
    size.width > max_size || size.height > max_size
}

/// Row-major grid of tiles covering `size` exactly, each at most `max_size` on a side.
///
/// Every row has the same column widths and every column the same row heights,
/// so tile widths along a row sum to the image width and heights along a column
/// sum to the image height.
pub fn tile_grid(size: Size<u32>, max_size: u32) -> Vec<TexelRect> {
    if size.is_empty() || max_size == 0 {
        return Vec::new();
    }

    let mut tiles = Vec::new();
    let mut y = 0;

    while y < size.height {
        let height = std::cmp::min(size.height - y, max_size);
        let mut x = 0;

        while x < size.width {
            let width = std::cmp::min(size.width - x, max_size);
            tiles.push(TexelRect::new(x, y, width, height));
            x += width;
        }

        y += height;
    }

    tiles
}

/// The tiles an image is processed as: the whole image when it fits a layer.
pub fn tiles_for(size: Size<u32>, max_size: u32) -> Vec<TexelRect> {
    if needs_tiling(size, max_size) {
        tile_grid(size, max_size)
    } else {
        vec![TexelRect::from_size(size)]
    }
}
