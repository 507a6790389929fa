/// Device-independent LED color. Each channel is a level in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl LedColor {
    pub const OFF: LedColor = LedColor::new(0.0, 0.0, 0.0);
    pub const RED: LedColor = LedColor::new(1.0, 0.0, 0.0);
    pub const GREEN: LedColor = LedColor::new(0.0, 1.0, 0.0);
    pub const AMBER: LedColor = LedColor::new(1.0, 1.0, 0.0);
    pub const WHITE: LedColor = LedColor::new(1.0, 1.0, 1.0);
    pub const BLUE: LedColor = LedColor::new(0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build a color from 6-bit RGB levels (0..=63), the native Mk2 range.
    pub fn rgb63(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 63.0, g as f32 / 63.0, b as f32 / 63.0)
    }

    /// Build a color from 2-bit red/green levels (0..=3), the native Mk1 range.
    pub fn red_green(red: u8, green: u8) -> Self {
        Self::new(red as f32 / 3.0, green as f32 / 3.0, 0.0)
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    pub fn is_off(&self) -> bool {
        self.r <= 0.0 && self.g <= 0.0 && self.b <= 0.0
    }
}

impl Default for LedColor {
    fn default() -> Self {
        LedColor::OFF
    }
}

/// Encoded LED components as sent to the hardware. Only the first
/// `ColorCapability::channels` entries are meaningful.
pub type LedComponents = [u8; 3];

/// Color depth a hardware adapter declares: how many channels it drives and
/// the highest level each channel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCapability {
    pub channels: u8,
    pub max_level: u8,
}

impl ColorCapability {
    /// Red and green, four levels each.
    pub const RED_GREEN: ColorCapability = ColorCapability {
        channels: 2,
        max_level: 3,
    };

    /// Full RGB, 64 levels each.
    pub const RGB: ColorCapability = ColorCapability {
        channels: 3,
        max_level: 63,
    };

    /// Scale a color into this capability's range, clamping out-of-range levels.
    /// A lit channel never rounds down to dark. Two-channel devices drop blue.
    pub fn encode(&self, color: LedColor) -> LedComponents {
        let level = |v: f32| {
            if v <= 0.0 {
                return 0;
            }
            ((v.min(1.0) * self.max_level as f32).round() as u8).max(1)
        };
        let mut out = [level(color.r), level(color.g), 0];
        if self.channels >= 3 {
            out[2] = level(color.b);
        }
        out
    }

    /// The meaningful prefix of an encoded value.
    pub fn slice<'a>(&self, components: &'a LedComponents) -> &'a [u8] {
        let len = (self.channels as usize).min(components.len());
        &components[..len]
    }
}
