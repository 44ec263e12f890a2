//! # Framebuffer Text Cells
//!
//! The platform only ever draws character cells: a byte plus a VGA
//! attribute (low nibble foreground, high nibble background) at a
//! column/row position. [`CellWriter`] is that interface; the bootloader
//! framebuffer implements it by rasterizing each cell with an
//! `embedded-graphics` mono font.
//!
//! Two users: the CPU fault banner and the boot [`Console`].

pub mod color;
#[allow(clippy::module_inception)]
mod framebuffer;

use bootloader_api::BootInfo;
use spin::Mutex;

pub use framebuffer::{FramebufferWriter, CELL_HEIGHT, CELL_WIDTH};

/// Light gray on black.
pub const DEFAULT_ATTRIBUTE: u8 = 0x07;

/// Draws one character cell.
pub trait CellWriter {
    fn put_cell(&mut self, col: usize, row: usize, byte: u8, attr: u8);
}

/// Write `text` left to right from (`col`, `row`). Returns the column after
/// the last byte.
pub fn write_at<W: CellWriter + ?Sized>(
    writer: &mut W,
    col: usize,
    row: usize,
    text: &[u8],
    attr: u8,
) -> usize {
    for (i, &byte) in text.iter().enumerate() {
        writer.put_cell(col + i, row, byte, attr);
    }
    col + text.len()
}

pub static FRAMEBUFFER: Mutex<Option<FramebufferWriter>> = Mutex::new(None);

pub fn init_framebuffer(info: &'static mut BootInfo) -> Result<(), &'static str> {
    let fb = info
        .framebuffer
        .as_mut()
        .ok_or("bootloader provided no framebuffer")?;
    let mut writer = FramebufferWriter::new(fb);
    writer.clear(color::Color::BLACK);
    *FRAMEBUFFER.lock() = Some(writer);
    Ok(())
}

// ============================================================================
// CONSOLE
// ============================================================================

/// Minimal teletype over a cell grid. Wraps at the right edge and cycles
/// back to the top row when it runs off the bottom, clearing each row as it
/// is entered.
pub struct Console {
    col: usize,
    row: usize,
    columns: usize,
    rows: usize,
    attr: u8,
}

impl Console {
    pub const fn new(columns: usize, rows: usize) -> Self {
        Self {
            col: 0,
            row: 0,
            columns,
            rows,
            attr: DEFAULT_ATTRIBUTE,
        }
    }

    pub fn set_attribute(&mut self, attr: u8) {
        self.attr = attr;
    }

    pub fn position(&self) -> (usize, usize) {
        (self.col, self.row)
    }

    pub fn put_byte<W: CellWriter + ?Sized>(&mut self, writer: &mut W, byte: u8) {
        if self.columns == 0 || self.rows == 0 {
            return;
        }
        match byte {
            b'\n' => self.new_line(writer),
            // Backspace
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                    writer.put_cell(self.col, self.row, b' ', self.attr);
                }
            }
            _ => {
                if self.col >= self.columns {
                    self.new_line(writer);
                }
                writer.put_cell(self.col, self.row, byte, self.attr);
                self.col += 1;
            }
        }
    }

    pub fn write_bytes<W: CellWriter + ?Sized>(&mut self, writer: &mut W, text: &[u8]) {
        for &byte in text {
            self.put_byte(writer, byte);
        }
    }

    fn new_line<W: CellWriter + ?Sized>(&mut self, writer: &mut W) {
        self.col = 0;
        self.row = (self.row + 1) % self.rows;
        for col in 0..self.columns {
            writer.put_cell(col, self.row, b' ', self.attr);
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::CellWriter;

    /// In-memory cell grid.
    pub struct CellGrid {
        pub columns: usize,
        pub cells: Vec<(u8, u8)>,
    }

    impl CellGrid {
        pub fn new(columns: usize, rows: usize) -> Self {
            Self {
                columns,
                cells: vec![(b' ', 0); columns * rows],
            }
        }

        pub fn cell(&self, col: usize, row: usize) -> (u8, u8) {
            self.cells[row * self.columns + col]
        }

        pub fn row_text(&self, row: usize) -> String {
            (0..self.columns)
                .map(|col| self.cell(col, row).0 as char)
                .collect::<String>()
                .trim_end()
                .to_string()
        }
    }

    impl CellWriter for CellGrid {
        fn put_cell(&mut self, col: usize, row: usize, byte: u8, attr: u8) {
            if col < self.columns {
                if let Some(cell) = self.cells.get_mut(row * self.columns + col) {
                    *cell = (byte, attr);
                }
            }
        }
    }
}
