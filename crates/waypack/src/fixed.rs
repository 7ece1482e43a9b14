use fixed::types::I24F8;

/// Signed 24.8 fixed-point number.
///
/// The raw word holds `value * 256`. Conversions from floating point round
/// half to even, so `Fixed::from_f64(f.to_f64()) == f` for every `f`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(I24F8);

impl Fixed {
    pub const ZERO: Fixed = Fixed(I24F8::ZERO);
    pub const ONE: Fixed = Fixed(I24F8::from_bits(256));

    pub const fn from_raw(raw: i32) -> Self {
        Self(I24F8::from_bits(raw))
    }

    pub const fn raw(self) -> i32 {
        self.0.to_bits()
    }

    /// Wraps on overflow, matching a shift of the integer into place.
    pub const fn from_int(v: i32) -> Self {
        Self(I24F8::from_bits(v.wrapping_mul(256)))
    }

    /// Saturates at the representable range. NaN maps to zero.
    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            return Self::ZERO;
        }
        Self(I24F8::saturating_from_num(v))
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    /// Integer part, truncated toward zero.
    pub fn to_int(self) -> i32 {
        self.0.round_to_zero().to_num()
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
