//! Framebuffer writer using embedded-graphics
use bootloader_api::info::FrameBuffer;
use embedded_graphics::{
    mono_font::{ascii::FONT_8X13, MonoTextStyleBuilder},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
    Drawable,
};

use crate::framebuffer::color::{attribute_colors, Color};
use crate::framebuffer::CellWriter;

/// Pixel size of one text cell.
pub const CELL_WIDTH: usize = 8;
pub const CELL_HEIGHT: usize = 16;

pub struct FramebufferWriter {
    framebuffer: &'static mut [u8],
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub bytes_per_pixel: usize,
}

impl FramebufferWriter {
    pub fn new(fb: &'static mut FrameBuffer) -> Self {
        let info = fb.info();

        Self {
            framebuffer: fb.buffer_mut(),
            width: info.width,
            height: info.height,
            stride: info.stride,
            bytes_per_pixel: info.bytes_per_pixel,
        }
    }

    pub fn columns(&self) -> usize {
        self.width / CELL_WIDTH
    }

    pub fn rows(&self) -> usize {
        self.height / CELL_HEIGHT
    }

    /// Fill entire screen with a color
    pub fn clear(&mut self, color: Color) {
        let rect = Rectangle::new(
            Point::zero(),
            Size::new(self.width as u32, self.height as u32),
        );
        rect.into_styled(PrimitiveStyle::with_fill(color.to_rgb888()))
            .draw(self)
            .ok();
    }
}

impl CellWriter for FramebufferWriter {
    fn put_cell(&mut self, col: usize, row: usize, byte: u8, attr: u8) {
        if col >= self.columns() || row >= self.rows() {
            return;
        }
        let (fg, bg) = attribute_colors(attr);
        let origin = Point::new((col * CELL_WIDTH) as i32, (row * CELL_HEIGHT) as i32);

        Rectangle::new(origin, Size::new(CELL_WIDTH as u32, CELL_HEIGHT as u32))
            .into_styled(PrimitiveStyle::with_fill(bg.to_rgb888()))
            .draw(self)
            .ok();

        // The font only covers ASCII; code page 437 extras render as '?'.
        let ch = if byte.is_ascii_graphic() || byte == b' ' {
            byte as char
        } else {
            '?'
        };
        let mut buf = [0u8; 4];
        let style = MonoTextStyleBuilder::new()
            .font(&FONT_8X13)
            .text_color(fg.to_rgb888())
            .build();
        let glyph_origin = origin + Point::new(0, 1);
        Text::with_baseline(ch.encode_utf8(&mut buf), glyph_origin, style, Baseline::Top)
            .draw(self)
            .ok();
    }
}

// Implement DrawTarget for embedded-graphics
impl DrawTarget for FramebufferWriter {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
                continue;
            }

            let offset = (y as usize * self.stride + x as usize) * self.bytes_per_pixel;
            if offset + self.bytes_per_pixel <= self.framebuffer.len() {
                self.framebuffer[offset] = color.b();
                self.framebuffer[offset + 1] = color.g();
                self.framebuffer[offset + 2] = color.r();
                if self.bytes_per_pixel == 4 {
                    self.framebuffer[offset + 3] = 255;
                }
            }
        }
        Ok(())
    }
}

impl OriginDimensions for FramebufferWriter {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}
