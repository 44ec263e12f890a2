//! Color representation and the 16-entry VGA text palette
use embedded_graphics::pixelcolor::Rgb888;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0x00, 0x00, 0x00);
    pub const BLUE: Color = Color::new(0x00, 0x00, 0xAA);
    pub const GREEN: Color = Color::new(0x00, 0xAA, 0x00);
    pub const CYAN: Color = Color::new(0x00, 0xAA, 0xAA);
    pub const RED: Color = Color::new(0xAA, 0x00, 0x00);
    pub const MAGENTA: Color = Color::new(0xAA, 0x00, 0xAA);
    pub const BROWN: Color = Color::new(0xAA, 0x55, 0x00);
    pub const LIGHT_GRAY: Color = Color::new(0xAA, 0xAA, 0xAA);
    pub const DARK_GRAY: Color = Color::new(0x55, 0x55, 0x55);
    pub const LIGHT_BLUE: Color = Color::new(0x55, 0x55, 0xFF);
    pub const LIGHT_GREEN: Color = Color::new(0x55, 0xFF, 0x55);
    pub const LIGHT_CYAN: Color = Color::new(0x55, 0xFF, 0xFF);
    pub const LIGHT_RED: Color = Color::new(0xFF, 0x55, 0x55);
    pub const PINK: Color = Color::new(0xFF, 0x55, 0xFF);
    pub const YELLOW: Color = Color::new(0xFF, 0xFF, 0x55);
    pub const WHITE: Color = Color::new(0xFF, 0xFF, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }


    pub fn to_rgb888(self) -> Rgb888 {
        Rgb888::new(self.r, self.g, self.b)
    }
}

/// VGA palette in index order.
pub const PALETTE: [Color; 16] = [
    Color::BLACK,
    Color::BLUE,
    Color::GREEN,
    Color::CYAN,
    Color::RED,
    Color::MAGENTA,
    Color::BROWN,
    Color::LIGHT_GRAY,
    Color::DARK_GRAY,
    Color::LIGHT_BLUE,
    Color::LIGHT_GREEN,
    Color::LIGHT_CYAN,
    Color::LIGHT_RED,
    Color::PINK,
    Color::YELLOW,
    Color::WHITE,
];

/// Split a text-mode attribute byte into (foreground, background).
/// Bit 7 is read as a bright background rather than blink.
pub fn attribute_colors(attr: u8) -> (Color, Color) {
    (PALETTE[(attr & 0x0F) as usize], PALETTE[(attr >> 4) as usize])
}

/// Build an attribute byte from two palette indices.
pub const fn attribute(fg: u8, bg: u8) -> u8 {
    (bg & 0x0F) << 4 | (fg & 0x0F)
}
