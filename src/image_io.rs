//! Image decoding, splitting and encoding around the `image` crate.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba32FImage};
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::rgba::Rgba;

/// An image cut into a `splits_x x splits_y` grid of parts, each resized to
/// a layer grid. Parts are stored row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageParts {
    pub parts: Vec<Array2<Rgba>>,
    pub splits_x: usize,
    pub splits_y: usize,
    pub orig_width: u32,
    pub orig_height: u32,
    pub has_alpha: bool,
}

impl ImageParts {
    /// A single-part image, e.g. a grid built in memory.
    pub fn single(grid: Array2<Rgba>) -> Self {
        let (height, width) = grid.dim();
        ImageParts {
            parts: vec![grid],
            splits_x: 1,
            splits_y: 1,
            orig_width: width as u32,
            orig_height: height as u32,
            has_alpha: true,
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Same geometry and metadata, different part grids.
    pub fn with_parts(&self, parts: Vec<Array2<Rgba>>) -> Self {
        ImageParts {
            parts,
            ..self.clone()
        }
    }
}

/// Loads, splits, resizes and saves images as RGBA grids in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHelper {
    pub filter: Option<FilterType>,
}

impl ImageHelper {
    fn filter(&self) -> FilterType {
        self.filter.unwrap_or(FilterType::Triangle)
    }

    /// Loads an image, splits it in `split x split` parts and resizes every
    /// part to `width x height`.
    ///
    /// # Arguments
    ///
    /// * `path` - Image file, any format the `image` crate decodes
    /// * `split` - Parts per axis, 0 and 1 both keep the whole image
    /// * `padding` - Pad right and bottom with transparent black so all parts are equal
    /// * `width` - Width of the layer grid
    /// * `height` - Height of the layer grid
    pub fn load_image(
        &self,
        path: &Path,
        split: usize,
        padding: bool,
        width: usize,
        height: usize,
    ) -> Result<ImageParts> {
        if !path.exists() {
            return Err(Error::Image(format!("could not find the image: {}", path.display())));
        }
        let decoded = image::open(path)
            .map_err(|e| Error::Image(format!("could not open {}: {e}", path.display())))?;
        Ok(self.split_dynamic(&decoded, split, padding, width, height))
    }

    pub fn split_dynamic(
        &self,
        decoded: &DynamicImage,
        split: usize,
        padding: bool,
        width: usize,
        height: usize,
    ) -> ImageParts {
        let has_alpha = decoded.color().has_alpha();
        let full = decoded.to_rgba32f();
        let (orig_width, orig_height) = full.dimensions();

        let (pieces, splits_x, splits_y) = split_image(&full, split, padding);
        let parts = pieces
            .iter()
            .map(|piece| image_to_grid(&self.resize(piece, width, height)))
            .collect();

        ImageParts {
            parts,
            splits_x,
            splits_y,
            orig_width,
            orig_height,
            has_alpha,
        }
    }

    /// Synthesizes low resolution inputs from target parts: each part is
    /// downscaled by `reduce_factor`, then resized to `width x height`.
    pub fn generate_input_image(
        &self,
        target: &ImageParts,
        reduce_factor: u32,
        width: usize,
        height: usize,
    ) -> ImageParts {
        let parts = target
            .parts
            .iter()
            .map(|grid| {
                let mut image = grid_to_image(grid);
                if reduce_factor > 1 {
                    let w = (image.width() / reduce_factor).max(1);
                    let h = (image.height() / reduce_factor).max(1);
                    image = imageops::resize(&image, w, h, self.filter());
                }
                image_to_grid(&self.resize(&image, width, height))
            })
            .collect();
        target.with_parts(parts)
    }

    /// Joins the parts back into one image, part sizes kept as they are.
    pub fn join(&self, image: &ImageParts) -> Result<Rgba32FImage> {
        if image.is_empty() || image.len() != image.splits_x * image.splits_y {
            return Err(Error::Image(format!(
                "cannot join {} parts as {}x{}",
                image.len(),
                image.splits_x,
                image.splits_y
            )));
        }
        let (part_height, part_width) = image.parts[0].dim();
        if image.parts.iter().any(|p| p.dim() != (part_height, part_width)) {
            return Err(Error::Image("cannot join parts of different sizes".to_string()));
        }

        let mut joined = Rgba32FImage::new(
            (part_width * image.splits_x) as u32,
            (part_height * image.splits_y) as u32,
        );
        for (index, part) in image.parts.iter().enumerate() {
            let x = (index % image.splits_x * part_width) as i64;
            let y = (index / image.splits_x * part_height) as i64;
            imageops::replace(&mut joined, &grid_to_image(part), x, y);
        }
        Ok(joined)
    }

    /// Joins the parts, resizes to the original size times `scale` and
    /// writes the file. The format follows the extension of `path`.
    pub fn save_image(&self, path: &Path, image: &ImageParts, scale: f32) -> Result<()> {
        let joined = self.join(image)?;
        let width = ((image.orig_width as f32 * scale).round() as u32).max(1);
        let height = ((image.orig_height as f32 * scale).round() as u32).max(1);
        let resized = DynamicImage::ImageRgba32F(self.resize(&joined, width as usize, height as usize));

        let encoded = if image.has_alpha {
            DynamicImage::ImageRgba8(resized.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(resized.to_rgb8())
        };
        encoded
            .save(path)
            .map_err(|e| Error::Image(format!("error saving image {}: {e}", path.display())))?;
        log::debug!("saved {}x{} image to {}", width, height, path.display());
        Ok(())
    }

    fn resize(&self, image: &Rgba32FImage, width: usize, height: usize) -> Rgba32FImage {
        if image.dimensions() == (width as u32, height as u32) {
            return image.clone();
        }
        imageops::resize(image, width as u32, height as u32, self.filter())
    }
}

/// Cuts `image` into parts of `ceil(size / split)` pixels per axis. Returns
/// the parts row by row with the number of parts per axis.
fn split_image(image: &Rgba32FImage, split: usize, padding: bool) -> (Vec<Rgba32FImage>, usize, usize) {
    if split <= 1 {
        return (vec![image.clone()], 1, 1);
    }
    let (width, height) = (image.width() as usize, image.height() as usize);
    let part_x = width.div_ceil(split).max(1);
    let part_y = height.div_ceil(split).max(1);
    let splits_x = width.div_ceil(part_x);
    let splits_y = height.div_ceil(part_y);

    let source = if padding {
        let mut padded = Rgba32FImage::new((splits_x * part_x) as u32, (splits_y * part_y) as u32);
        imageops::replace(&mut padded, image, 0, 0);
        padded
    } else {
        image.clone()
    };

    let mut parts = Vec::with_capacity(splits_x * splits_y);
    for j in 0..splits_y {
        for i in 0..splits_x {
            let x = i * part_x;
            let y = j * part_y;
            let w = part_x.min(source.width() as usize - x);
            let h = part_y.min(source.height() as usize - y);
            parts.push(imageops::crop_imm(&source, x as u32, y as u32, w as u32, h as u32).to_image());
        }
    }
    (parts, splits_x, splits_y)
}

pub fn image_to_grid(image: &Rgba32FImage) -> Array2<Rgba> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        Rgba::from_array(image.get_pixel(x as u32, y as u32).0)
    })
}

pub fn grid_to_image(grid: &Array2<Rgba>) -> Rgba32FImage {
    let (height, width) = grid.dim();
    Rgba32FImage::from_fn(width as u32, height as u32, |x, y| {
        image::Rgba(grid[(y as usize, x as usize)].to_array())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba32F(Rgba32FImage::from_fn(width, height, |x, y| {
            image::Rgba([x as f32 / width as f32, y as f32 / height as f32, 0.5, 1.0])
        }))
    }

    #[test]
    fn test_split_counts() {
        let helper = ImageHelper::default();
        let parts = helper.split_dynamic(&gradient(10, 7), 3, false, 4, 4);
        assert_eq!((parts.splits_x, parts.splits_y), (3, 3));
        assert_eq!(parts.len(), 9);
        assert!(parts.parts.iter().all(|p| p.dim() == (4, 4)));

        // 5 pixels in parts of 2: the third column holds the remainder
        let parts = helper.split_dynamic(&gradient(5, 5), 4, false, 2, 2);
        assert_eq!((parts.splits_x, parts.splits_y), (3, 3));

        let whole = helper.split_dynamic(&gradient(5, 5), 0, false, 2, 2);
        assert_eq!(whole.len(), 1);
        assert_eq!((whole.orig_width, whole.orig_height), (5, 5));
    }

    #[test]
    fn test_padding_makes_equal_parts() {
        let full = gradient(5, 5).to_rgba32f();
        let (parts, _, _) = split_image(&full, 2, true);
        assert!(parts.iter().all(|p| p.dimensions() == (3, 3)));
        // bottom-right corner of the last part is padding
        assert_eq!(parts[3].get_pixel(2, 2).0, [0.0, 0.0, 0.0, 0.0]);

        let (parts, _, _) = split_image(&full, 2, false);
        assert_eq!(parts[3].dimensions(), (2, 2));
    }

    #[test]
    fn test_join_restores_layout() {
        let helper = ImageHelper::default();
        let grids: Vec<Array2<Rgba>> = (0..4).map(|i| Array2::from_elem((2, 3), Rgba::splat(i as f32 / 4.0))).collect();
        let image = ImageParts {
            parts: grids,
            splits_x: 2,
            splits_y: 2,
            orig_width: 6,
            orig_height: 4,
            has_alpha: true,
        };
        let joined = helper.join(&image).unwrap();
        assert_eq!(joined.dimensions(), (6, 4));
        assert_eq!(joined.get_pixel(4, 0).0, [0.25; 4]);
        assert_eq!(joined.get_pixel(0, 3).0, [0.5; 4]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let helper = ImageHelper::default();

        let image = ImageParts::single(Array2::from_elem((4, 4), Rgba::new(1.0, 0.0, 0.0, 1.0)));
        helper.save_image(&path, &image, 2.0).unwrap();

        let loaded = helper.load_image(&path, 1, false, 2, 2).unwrap();
        assert_eq!((loaded.orig_width, loaded.orig_height), (8, 8));
        let pixel = loaded.parts[0][(0, 0)];
        assert!((pixel.r - 1.0).abs() < 1e-6 && pixel.g.abs() < 1e-6);

        assert!(matches!(
            helper.load_image(&dir.path().join("missing.png"), 1, false, 2, 2),
            Err(Error::Image(_))
        ));
    }

    #[test]
    fn test_generated_input_keeps_geometry() {
        let helper = ImageHelper::default();
        let target = helper.split_dynamic(&gradient(8, 8), 2, false, 4, 4);
        let input = helper.generate_input_image(&target, 4, 2, 2);
        assert_eq!(input.len(), 4);
        assert_eq!((input.splits_x, input.orig_width), (2, 8));
        assert!(input.parts.iter().all(|p| p.dim() == (2, 2)));
    }
}
