use std::collections::HashMap;
use yansi::Color;

/// Highlight of the frame being inspected.
pub const VIEW_INFO_COLOR: Rgb = Rgb::new(0x41, 0x69, 0xe1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black or white, whichever reads better on top of `self`.
    pub fn contrast_text(self) -> Rgb {
        let brightness =
            (299 * self.r as u32 + 587 * self.g as u32 + 114 * self.b as u32) / 1000;
        if brightness > 128 {
            Rgb::new(0, 0, 0)
        } else {
            Rgb::new(255, 255, 255)
        }
    }
}

impl From<Rgb> for Color {
    fn from(rgb: Rgb) -> Self {
        Color::RGB(rgb.r, rgb.g, rgb.b)
    }
}

/// Hands out flamegraph colors (reds, oranges and yellows), one per key.
///
/// A key always gets the same color, within a run and across runs.
#[derive(Debug, Default)]
pub struct ColorPalette {
    assigned: HashMap<String, Rgb>,
}

impl ColorPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_color(&mut self, key: &str) -> Rgb {
        if let Some(color) = self.assigned.get(key) {
            return *color;
        }
        let color = assign_color(key);
        self.assigned.insert(key.to_string(), color);
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

fn assign_color(key: &str) -> Rgb {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    let [a, b, c, ..] = hash.to_le_bytes();
    Rgb::new(
        205 + (a as u32 * 50 / 255) as u8,
        (b as u32 * 230 / 255) as u8,
        (c as u32 * 55 / 255) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_color() {
        let mut palette = ColorPalette::new();
        let first = palette.get_color("runtime");
        assert_eq!(palette.get_color("runtime"), first);
        assert_eq!(ColorPalette::new().get_color("runtime"), first);
        palette.get_color("main");
        assert_eq!(palette.len(), 2);
    }

    #[test]
    fn colors_stay_in_flame_range() {
        let mut palette = ColorPalette::new();
        for key in ["a", "b", "runtime", "expfmt", "main", "syscall", ""] {
            let color = palette.get_color(key);
            assert!(color.r >= 205, "{key}: {color:?}");
            assert!(color.g <= 230, "{key}: {color:?}");
            assert!(color.b <= 55, "{key}: {color:?}");
        }
    }

    #[test]
    fn contrast() {
        assert_eq!(Rgb::new(255, 230, 55).contrast_text(), Rgb::new(0, 0, 0));
        assert_eq!(Rgb::new(205, 0, 0).contrast_text(), Rgb::new(255, 255, 255));
        assert_eq!(VIEW_INFO_COLOR.contrast_text(), Rgb::new(255, 255, 255));
        assert_eq!(Color::from(Rgb::new(1, 2, 3)), Color::RGB(1, 2, 3));
    }
}
