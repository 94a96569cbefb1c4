use super::ImageFormat;
use crate::{Error, Result, cipher::write_atomic, transcoder::Size};
use image::{RgbImage, imageops};
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Pixel rectangle of one thumbnail inside a sprite sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    /// Media fragment appended to the image reference of a cue.
    pub fn fragment(&self) -> String {
        format!("#xywh={},{},{},{}", self.x, self.y, self.w, self.h)
    }
}

/// Grid geometry of the sprite sheets for a fixed tile size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) tile: Size,
    pub(crate) columns: u32,
    pub(crate) rows: u32,
}

impl Layout {
    pub(crate) fn new(tile: Size, max_width: u32, max_height: u32) -> Result<Self> {
        let columns = max_width / tile.width.max(1);
        let rows = max_height / tile.height.max(1);

        if columns == 0 || rows == 0 {
            return Err(Error::Configuration(format!(
                "thumbnail size {tile} does not fit in a {max_width}x{max_height} sprite sheet"
            )));
        }

        if columns.checked_mul(rows).is_none() {
            return Err(Error::Configuration(format!(
                "{columns}x{rows} thumbnails per sprite sheet is too many"
            )));
        }

        Ok(Self {
            tile,
            columns,
            rows,
        })
    }

    pub(crate) fn per_sheet(&self) -> usize {
        (self.columns * self.rows) as usize
    }

    pub(crate) fn sheets(&self, count: usize) -> usize {
        count.div_ceil(self.per_sheet())
    }

    /// Sheet number and region of tile `index`, filled row by row.
    pub(crate) fn place(&self, index: usize) -> (usize, Region) {
        let sheet = index / self.per_sheet();
        let slot = (index % self.per_sheet()) as u32;

        (
            sheet,
            Region {
                x: (slot % self.columns) * self.tile.width,
                y: (slot / self.columns) * self.tile.height,
                w: self.tile.width,
                h: self.tile.height,
            },
        )
    }

    /// Dimensions of a sheet holding `tiles` tiles. Partial sheets shrink to
    /// the rows (and, for a single row, the columns) actually used.
    pub(crate) fn sheet_size(&self, tiles: usize) -> Size {
        let tiles = tiles.clamp(1, self.per_sheet()) as u32;
        let columns = tiles.min(self.columns);
        let rows = tiles.div_ceil(self.columns);
        Size::new(columns * self.tile.width, rows * self.tile.height)
    }
}

pub(crate) fn sheet_name(sheet: usize, sheets: usize, format: ImageFormat) -> String {
    if sheets == 1 {
        format!("sprite.{}", format.extension())
    } else {
        format!("sprite_{}.{}", sheet, format.extension())
    }
}

/// Tiles `images` (in sample order) into one sheet and writes it to `output`.
pub(crate) fn compose(
    layout: &Layout,
    images: &[PathBuf],
    first: usize,
    format: ImageFormat,
    output: &Path,
) -> Result<()> {
    let size = layout.sheet_size(images.len());
    let mut sheet = RgbImage::new(size.width, size.height);

    for (offset, path) in images.iter().enumerate() {
        let (_, region) = layout.place(first + offset);
        let mut tile = image::open(path)?.to_rgb8();

        if tile.dimensions() != (region.w, region.h) {
            debug!(
                "Resizing {} from {}x{} to {}x{}",
                path.display(),
                tile.width(),
                tile.height(),
                region.w,
                region.h
            );
            tile = imageops::resize(&tile, region.w, region.h, imageops::FilterType::Triangle);
        }

        imageops::overlay(&mut sheet, &tile, region.x as i64, region.y as i64);
    }

    write_atomic(output, |writer| {
        sheet.write_to(writer, format.as_image_format())?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = Layout::new(Size::new(160, 90), 4096, 4096).unwrap();
        assert_eq!((layout.columns, layout.rows), (25, 45));
        assert_eq!(layout.sheets(5), 1);
        assert_eq!(layout.sheet_size(5), Size::new(800, 90));
        assert_eq!(layout.sheet_size(30), Size::new(4000, 180));

        let (sheet, region) = layout.place(26);
        assert_eq!(sheet, 0);
        assert_eq!(region, Region { x: 160, y: 90, w: 160, h: 90 });
        assert_eq!(region.fragment(), "#xywh=160,90,160,90");
    }

    #[test]
    fn test_layout_overflow() {
        let layout = Layout::new(Size::new(100, 100), 200, 200).unwrap();
        assert_eq!(layout.per_sheet(), 4);
        assert_eq!(layout.sheets(9), 3);

        let (sheet, region) = layout.place(5);
        assert_eq!(sheet, 1);
        assert_eq!((region.x, region.y), (100, 0));

        assert_eq!(sheet_name(0, 1, ImageFormat::Png), "sprite.png");
        assert_eq!(sheet_name(2, 3, ImageFormat::Jpg), "sprite_2.jpg");
    }

    #[test]
    fn test_layout_too_small() {
        assert!(Layout::new(Size::new(500, 90), 400, 400).is_err());
    }

    #[test]
    fn test_layout_too_many_tiles() {
        assert!(matches!(
            Layout::new(Size::new(1, 1), 70000, 70000),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_compose() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(Size::new(4, 2), 8, 4).unwrap();
        let mut images = Vec::new();

        for (i, value) in [10_u8, 200, 90].into_iter().enumerate() {
            let path = dir.path().join(format!("{i}.png"));
            RgbImage::from_pixel(4, 2, image::Rgb([value, value, value]))
                .save(&path)
                .unwrap();
            images.push(path);
        }

        let output = dir.path().join("sprite.png");
        compose(&layout, &images, 0, ImageFormat::Png, &output).unwrap();

        let sheet = image::open(&output).unwrap().to_rgb8();
        assert_eq!(sheet.dimensions(), (8, 4));
        assert_eq!(sheet.get_pixel(0, 0).0, [10, 10, 10]);
        assert_eq!(sheet.get_pixel(5, 1).0, [200, 200, 200]);
        assert_eq!(sheet.get_pixel(1, 3).0, [90, 90, 90]);
        assert_eq!(sheet.get_pixel(6, 3).0, [0, 0, 0]);
    }
}
