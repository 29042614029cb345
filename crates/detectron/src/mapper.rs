use common::span_debug;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::Array3;

use crate::config::{InputFormat, ProcessorConfig};
use crate::error::DetectronError;
use crate::input::{MappedInput, ModelInput};

/// Turns a dictionary that only names its image into a model-ready input.
pub trait ImageMapper {
    fn map(&self, input: ModelInput) -> anyhow::Result<MappedInput>;
}

/// Test-time mapper: decode the file, resize so the shorter edge matches
/// `min_size` without letting the longer edge exceed `max_size`, and emit a
/// CHW `u8` tensor in the configured channel order.
#[derive(Debug, Clone)]
pub struct ResizeShortestEdgeMapper {
    pub min_size: u32,
    pub max_size: u32,
    pub format: InputFormat,
}

impl ResizeShortestEdgeMapper {
    pub fn new(min_size: u32, max_size: u32, format: InputFormat) -> Self {
        Self {
            min_size,
            max_size,
            format,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(
            config.min_size_test,
            config.max_size_test,
            config.input_format,
        )
    }

    /// Output `(height, width)` for an image of the given size.
    pub fn output_size(&self, height: u32, width: u32) -> (u32, u32) {
        let (h, w) = (height as f64, width as f64);
        let size = self.min_size as f64;
        let scale = size / h.min(w);
        let (mut new_h, mut new_w) = if h < w {
            (size, scale * w)
        } else {
            (scale * h, size)
        };

        let longest = new_h.max(new_w);
        if longest > self.max_size as f64 {
            let scale = self.max_size as f64 / longest;
            new_h *= scale;
            new_w *= scale;
        }

        ((new_h + 0.5) as u32, (new_w + 0.5) as u32)
    }

    fn resize(
        &self,
        pixels: Vec<u8>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Vec<u8>, u32, u32)> {
        let _s = span_debug!("resize_shortest_edge");

        let (new_height, new_width) = self.output_size(height, width);
        if (new_height, new_width) == (height, width) {
            return Ok((pixels, width, height));
        }

        let src = Image::from_vec_u8(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        Ok((resized.buffer().to_vec(), new_width, new_height))
    }
}

/// Interleaved RGB pixels to a planar CHW array in `format` channel order.
pub(crate) fn hwc_to_chw(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: InputFormat,
) -> Array3<u8> {
    let (w, h) = (width as usize, height as usize);
    Array3::from_shape_fn((3, h, w), |(c, y, x)| {
        let channel = match format {
            InputFormat::Rgb => c,
            InputFormat::Bgr => 2 - c,
        };
        pixels[(y * w + x) * 3 + channel]
    })
}

impl ImageMapper for ResizeShortestEdgeMapper {
    fn map(&self, input: ModelInput) -> anyhow::Result<MappedInput> {
        let file_name = input
            .file_name
            .clone()
            .ok_or(DetectronError::MissingImageSource)?;

        let rgb = image::open(&file_name)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        tracing::trace!(file_name = %file_name, width, height, "Decoded image");

        let (pixels, width, height) = self.resize(rgb.into_raw(), width, height)?;
        let chw = hwc_to_chw(&pixels, width, height, self.format);

        Ok(MappedInput {
            image: chw.into(),
            file_name: input.file_name,
            height: input.height,
            width: input.width,
        })
    }
}
