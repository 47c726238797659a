use bitfield_struct::bitfield;

/// The 16 colours of the text-mode palette.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VgaColour {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

impl VgaColour {
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value & 0xF {
            0 => Self::Black,
            1 => Self::Blue,
            2 => Self::Green,
            3 => Self::Cyan,
            4 => Self::Red,
            5 => Self::Magenta,
            6 => Self::Brown,
            7 => Self::LightGrey,
            8 => Self::DarkGrey,
            9 => Self::LightBlue,
            10 => Self::LightGreen,
            11 => Self::LightCyan,
            12 => Self::LightRed,
            13 => Self::Pink,
            14 => Self::Yellow,
            _ => Self::White,
        }
    }
}

/// Colour attribute byte of a cell.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Attribute {
    /// Bits 0-3.
    #[bits(4)]
    pub foreground: VgaColour,
    /// Bits 4-7. Bit 7 blinks on adapters configured for it.
    #[bits(4)]
    pub background: VgaColour,
}

/// Grey on black.
pub const DEFAULT_ATTRIBUTE: Attribute = Attribute::new()
    .with_foreground(VgaColour::LightGrey)
    .with_background(VgaColour::Black);

/// One character cell as stored in text memory.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VgaCell {
    pub character: u8,
    pub attribute: Attribute,
}

impl VgaCell {
    pub const BLANK: Self = Self::new(b' ', DEFAULT_ATTRIBUTE);

    #[inline]
    #[must_use]
    pub const fn new(character: u8, attribute: Attribute) -> Self {
        Self {
            character,
            attribute,
        }
    }

    /// The 16-bit word the adapter reads: character low, attribute high.
    #[inline]
    #[must_use]
    pub const fn into_word(self) -> u16 {
        u16::from_le_bytes([self.character, self.attribute.into_bits()])
    }

    #[inline]
    #[must_use]
    pub const fn from_word(word: u16) -> Self {
        let [character, attribute] = word.to_le_bytes();
        Self::new(character, Attribute::from_bits(attribute))
    }
}

const _: () = assert!(size_of::<VgaCell>() == 2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attribute_is_grey_on_black() {
        assert_eq!(DEFAULT_ATTRIBUTE.into_bits(), 0x07);
        assert_eq!(VgaCell::BLANK.into_word(), 0x0720);
    }

    #[test]
    fn attribute_nibbles() {
        let attr = Attribute::new()
            .with_foreground(VgaColour::Yellow)
            .with_background(VgaColour::Blue);
        assert_eq!(attr.into_bits(), 0x1E);
        assert_eq!(Attribute::from_bits(0x4F).foreground(), VgaColour::White);
        assert_eq!(Attribute::from_bits(0x4F).background(), VgaColour::Red);
    }

    #[test]
    fn word_layout() {
        let cell = VgaCell::new(b'A', Attribute::from_bits(0x2C));
        assert_eq!(cell.into_word(), 0x2C41);
        assert_eq!(VgaCell::from_word(0x2C41), cell);
    }
}
