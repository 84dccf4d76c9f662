//! Format conversion from decoded plugin frames to host textures.
//!
//! The actual pixel work happens in host shaders; this module picks the
//! shader for a stream, sizes the output texture and tracks which decoder
//! frame the texture currently shows.

use crate::error::ConvertError;
use crate::plugin::{DecoderBackend, DecoderHandle, PixelFormat};

/// Largest texture edge the converter will allocate.
pub const MAX_TEXTURE_DIMENSION: u32 = 4096;

/// Host shader that maps a plugin pixel layout to RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionShader {
    Bgra,
    Yuv2,
    /// YCbCr with the Rec. 709 colour matrix.
    Yuv2Rec709,
    Copy,
    HapYCoCg,
}

impl ConversionShader {
    pub fn for_format(format: PixelFormat, extended_range: bool) -> Option<Self> {
        match format {
            PixelFormat::Rgba32 => Some(ConversionShader::Bgra),
            PixelFormat::YCbCr if extended_range => Some(ConversionShader::Yuv2Rec709),
            PixelFormat::YCbCr => Some(ConversionShader::Yuv2),
            PixelFormat::HapRgb | PixelFormat::HapRgba => Some(ConversionShader::Copy),
            PixelFormat::HapRgbHq => Some(ConversionShader::HapYCoCg),
            PixelFormat::Unknown => {
                log::error!("Unknown video format {format:?}");
                None
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConversionShader::Bgra => "bgra",
            ConversionShader::Yuv2 => "yuv2",
            ConversionShader::Yuv2Rec709 => "yuv2-709",
            ConversionShader::Copy => "copy",
            ConversionShader::HapYCoCg => "hap-ycocg",
        }
    }
}

/// Everything a converter needs to size itself for one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterSpec {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub extended_range: bool,
    pub swap_red_blue: bool,
}

/// Description of the texture a converter renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTexture {
    pub width: u32,
    pub height: u32,
    /// Allocated size; larger than `width`x`height` for block-compressed input.
    pub alloc_width: u32,
    pub alloc_height: u32,
    pub shader: ConversionShader,
    pub swap_red_blue: bool,
}

pub trait FormatConverter {
    /// (Re)bind to a stream. Called on every successful property load; a
    /// previously built converter is reused.
    fn build(
        &mut self,
        backend: &dyn DecoderBackend,
        handle: DecoderHandle,
        spec: &ConverterSpec,
    ) -> Result<(), ConvertError>;

    /// Pull the newest decoded frame into the output texture.
    fn update(&mut self, backend: &dyn DecoderBackend, handle: DecoderHandle) -> bool;

    /// Release per-stream resources but stay reusable.
    fn reset(&mut self);

    fn output_texture(&self) -> Option<&OutputTexture>;

    /// Decoder frame currently shown, if any picture was converted yet.
    fn display_frame(&self) -> Option<u32>;

    fn is_valid_picture(&self) -> bool {
        self.display_frame().is_some()
    }
}

/// Creates the converter a session builds lazily on its first visual stream.
pub trait ConverterFactory {
    fn create(&self) -> Box<dyn FormatConverter>;
}

#[derive(Debug, Default)]
pub struct ShaderConverter {
    output: Option<OutputTexture>,
    display_frame: Option<u32>,
    frames_converted: u64,
}

impl ShaderConverter {
    pub fn frames_converted(&self) -> u64 {
        self.frames_converted
    }
}

fn align_to_block(v: u32) -> u32 {
    v.div_ceil(4) * 4
}

impl FormatConverter for ShaderConverter {
    fn build(
        &mut self,
        _backend: &dyn DecoderBackend,
        _handle: DecoderHandle,
        spec: &ConverterSpec,
    ) -> Result<(), ConvertError> {
        self.reset();

        if spec.width == 0
            || spec.height == 0
            || spec.width > MAX_TEXTURE_DIMENSION
            || spec.height > MAX_TEXTURE_DIMENSION
        {
            return Err(ConvertError::InvalidSize {
                width: spec.width,
                height: spec.height,
            });
        }
        let shader = ConversionShader::for_format(spec.format, spec.extended_range)
            .ok_or(ConvertError::UnsupportedFormat(spec.format))?;

        let (alloc_width, alloc_height) = if spec.format.is_block_compressed() {
            (align_to_block(spec.width), align_to_block(spec.height))
        } else {
            (spec.width, spec.height)
        };

        log::debug!(
            "Format converter: {}x{} via {} (alloc {}x{})",
            spec.width,
            spec.height,
            shader.name(),
            alloc_width,
            alloc_height
        );

        self.output = Some(OutputTexture {
            width: spec.width,
            height: spec.height,
            alloc_width,
            alloc_height,
            shader,
            swap_red_blue: spec.swap_red_blue,
        });
        Ok(())
    }

    fn update(&mut self, backend: &dyn DecoderBackend, handle: DecoderHandle) -> bool {
        if self.output.is_none() {
            return false;
        }
        self.display_frame = Some(backend.current_frame(handle));
        self.frames_converted += 1;
        true
    }

    fn reset(&mut self) {
        self.output = None;
        self.display_frame = None;
    }

    fn output_texture(&self) -> Option<&OutputTexture> {
        self.output.as_ref()
    }

    fn display_frame(&self) -> Option<u32> {
        self.display_frame
    }
}

#[derive(Debug, Default)]
pub struct ShaderConverterFactory;

impl ConverterFactory for ShaderConverterFactory {
    fn create(&self) -> Box<dyn FormatConverter> {
        Box::new(ShaderConverter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::mock::MockBackend;

    fn handle() -> DecoderHandle {
        DecoderHandle::from_raw(3).unwrap()
    }

    fn spec(width: u32, height: u32, format: PixelFormat) -> ConverterSpec {
        ConverterSpec {
            width,
            height,
            format,
            extended_range: false,
            swap_red_blue: false,
        }
    }

    #[test]
    fn shader_per_format() {
        use ConversionShader as S;
        assert_eq!(S::for_format(PixelFormat::Rgba32, false), Some(S::Bgra));
        assert_eq!(S::for_format(PixelFormat::YCbCr, false), Some(S::Yuv2));
        assert_eq!(S::for_format(PixelFormat::YCbCr, true), Some(S::Yuv2Rec709));
        assert_eq!(S::for_format(PixelFormat::HapRgb, true), Some(S::Copy));
        assert_eq!(S::for_format(PixelFormat::HapRgba, false), Some(S::Copy));
        assert_eq!(S::for_format(PixelFormat::HapRgbHq, false), Some(S::HapYCoCg));
        assert_eq!(S::for_format(PixelFormat::Unknown, false), None);
    }

    #[test]
    fn build_sizes_output() {
        let mock = MockBackend::new();
        let mut c = ShaderConverter::default();
        let mut s = spec(640, 360, PixelFormat::YCbCr);
        s.extended_range = true;
        s.swap_red_blue = true;
        c.build(&mock, handle(), &s).unwrap();
        let out = c.output_texture().unwrap();
        assert_eq!((out.width, out.height), (640, 360));
        assert_eq!((out.alloc_width, out.alloc_height), (640, 360));
        assert_eq!(out.shader, ConversionShader::Yuv2Rec709);
        assert!(out.swap_red_blue);
        assert!(!c.is_valid_picture());
    }

    #[test]
    fn hap_output_is_block_aligned() {
        let mock = MockBackend::new();
        let mut c = ShaderConverter::default();
        c.build(&mock, handle(), &spec(1918, 1077, PixelFormat::HapRgba))
            .unwrap();
        let out = c.output_texture().unwrap();
        assert_eq!((out.alloc_width, out.alloc_height), (1920, 1080));
        assert_eq!((out.width, out.height), (1918, 1077));
    }

    #[test]
    fn build_rejects_bad_input() {
        let mock = MockBackend::new();
        let mut c = ShaderConverter::default();
        assert_eq!(
            c.build(&mock, handle(), &spec(640, 360, PixelFormat::Unknown)),
            Err(ConvertError::UnsupportedFormat(PixelFormat::Unknown))
        );
        assert_eq!(
            c.build(&mock, handle(), &spec(4097, 16, PixelFormat::Rgba32)),
            Err(ConvertError::InvalidSize {
                width: 4097,
                height: 16
            })
        );
        assert_eq!(
            c.build(&mock, handle(), &spec(0, 16, PixelFormat::Rgba32)),
            Err(ConvertError::InvalidSize { width: 0, height: 16 })
        );
        assert!(c.output_texture().is_none());
    }

    #[test]
    fn update_tracks_display_frame() {
        let mock = MockBackend::new();
        let mut c = ShaderConverter::default();
        assert!(!c.update(&mock, handle()));

        c.build(&mock, handle(), &spec(64, 64, PixelFormat::Rgba32))
            .unwrap();
        mock.configure(|s| s.current_frame = 12);
        assert!(c.update(&mock, handle()));
        assert_eq!(c.display_frame(), Some(12));
        assert!(c.is_valid_picture());
        assert_eq!(c.frames_converted(), 1);

        c.reset();
        assert!(!c.is_valid_picture());
        assert!(c.output_texture().is_none());
    }
}
