//! SSD1306 OLED status display.
//!
//! Seven text rows, one per [`DisplayRow`]. `show`/`clear` only touch the
//! row buffer; the frame is redrawn and flushed on the periodic refresh.

use ble_thermometer::platform::{DisplayRow, StatusDisplay};
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use heapless::String;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use super::Board;

/// Characters that fit a 128 px row in the 6x10 font.
const ROW_CHARS: usize = 21;

/// Vertical distance between row baselines (px).
const ROW_PITCH: i32 = 9;

/// Type alias for the concrete display driver.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

pub struct StatusScreen<I2C> {
    display: Display<I2C>,
    rows: [String<ROW_CHARS>; DisplayRow::COUNT],
    dirty: bool,
}

impl<I2C> StatusScreen<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    /// Initialise the SSD1306 and clear the screen.
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        let _ = display.init();
        display.clear_buffer();
        let _ = display.flush();
        Self {
            display,
            rows: Default::default(),
            dirty: false,
        }
    }

    fn set_row(&mut self, row: DisplayRow, text: &str) {
        let slot = &mut self.rows[row.index()];
        if slot.as_str() == text {
            return;
        }
        slot.clear();
        // Truncate to the row width.
        for c in text.chars() {
            if slot.push(c).is_err() {
                break;
            }
        }
        self.dirty = true;
    }

    fn redraw(&mut self) {
        if !self.dirty {
            return;
        }
        self.display.clear_buffer();
        for (i, text) in self.rows.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let y = 8 + i as i32 * ROW_PITCH;
            let _ = Text::new(text.as_str(), Point::new(0, y), text_style()).draw(&mut self.display);
        }
        let _ = self.display.flush();
        self.dirty = false;
    }
}

impl StatusDisplay for Board {
    fn show(&mut self, row: DisplayRow, text: &str) {
        self.screen.set_row(row, text);
    }

    fn clear(&mut self, row: DisplayRow) {
        self.screen.set_row(row, "");
    }

    fn refresh(&mut self) {
        self.screen.redraw();
    }
}
