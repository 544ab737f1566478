// ABOUTME: Unified sized-integer value: one i64 storage plus a kind tag,
// ABOUTME: with range checking, masking, and promotion shared by one core table.

use crate::error::{SourceSpan, ZephyrError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerKind {
    DefaultInt,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntegerKind {
    /// `default_int` and `i32` are interchangeable everywhere, including
    /// display and suffix parsing.
    pub fn type_name(&self) -> &'static str {
        match self {
            IntegerKind::DefaultInt => "int",
            IntegerKind::I8 => "i8",
            IntegerKind::I16 => "i16",
            IntegerKind::I32 => "i32",
            IntegerKind::I64 => "i64",
            IntegerKind::U8 => "u8",
            IntegerKind::U16 => "u16",
            IntegerKind::U32 => "u32",
            IntegerKind::U64 => "u64",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<IntegerKind> {
        match suffix {
            "i8" => Some(IntegerKind::I8),
            "i16" => Some(IntegerKind::I16),
            "i32" => Some(IntegerKind::I32),
            "i64" => Some(IntegerKind::I64),
            "u8" => Some(IntegerKind::U8),
            "u16" => Some(IntegerKind::U16),
            "u32" => Some(IntegerKind::U32),
            "u64" => Some(IntegerKind::U64),
            _ => None,
        }
    }

    /// Normalizes `DefaultInt` to `I32` for range/bit-width purposes; the two
    /// are interchangeable everywhere else.
    fn normalized(&self) -> IntegerKind {
        match self {
            IntegerKind::DefaultInt => IntegerKind::I32,
            k => *k,
        }
    }

    pub fn bit_width(&self) -> u32 {
        match self.normalized() {
            IntegerKind::I8 | IntegerKind::U8 => 8,
            IntegerKind::I16 | IntegerKind::U16 => 16,
            IntegerKind::I32 | IntegerKind::U32 => 32,
            IntegerKind::I64 | IntegerKind::U64 => 64,
            IntegerKind::DefaultInt => unreachable!(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self.normalized(),
            IntegerKind::I8 | IntegerKind::I16 | IntegerKind::I32 | IntegerKind::I64
        )
    }

    /// Inclusive legal range for this kind, as (lo, hi) in i128 so u64's
    /// upper bound doesn't overflow the computation.
    pub fn range(&self) -> (i128, i128) {
        let width = self.bit_width();
        if self.is_signed() {
            let half = 1i128 << (width - 1);
            (-half, half - 1)
        } else {
            (0, (1i128 << width) - 1)
        }
    }

    pub fn fits(&self, value: i128) -> bool {
        let (lo, hi) = self.range();
        value >= lo && value <= hi
    }

    /// Relative "distance" used by the overload resolver's implicit integer
    /// conversion scoring: widening within the same signedness is cheapest.
    pub fn widening_distance_to(&self, target: IntegerKind) -> Option<u32> {
        if *self == target {
            return Some(0);
        }
        if self.is_signed() == target.is_signed() && target.bit_width() >= self.bit_width() {
            return Some((target.bit_width() - self.bit_width()) / 8 + 1);
        }
        // unsigned -> signed widening is allowed if the signed kind is strictly wider
        if !self.is_signed() && target.is_signed() && target.bit_width() > self.bit_width() {
            return Some((target.bit_width() - self.bit_width()) / 8 + 2);
        }
        None
    }
}

/// Promotion rule for two integer kinds meeting in a binary operation:
/// the wider kind wins; at equal width, signed wins unless the value
/// actually in play only fits the unsigned kind (callers needing that
/// finer rule should use `promote_with_value`).
pub fn get_promotion_kind(a: IntegerKind, b: IntegerKind) -> IntegerKind {
    let (na, nb) = (a.normalized(), b.normalized());
    if na.bit_width() != nb.bit_width() {
        return if na.bit_width() > nb.bit_width() { a } else { b };
    }
    if na.is_signed() == nb.is_signed() {
        return a;
    }
    // equal width, mixed signedness: signed wins
    if na.is_signed() { a } else { b }
}

/// Per §9's documented open-question resolution: when a value from the
/// unsigned side doesn't fit the signed candidate, promote to the next
/// wider kind that can hold it unsigned; if none exists, fall back to the
/// unsigned kind of the same width.
pub fn promote_with_value(a: IntegerKind, b: IntegerKind, a_val: i64, b_val: i64) -> IntegerKind {
    let base = get_promotion_kind(a, b);
    if base.fits(a_val as i128) && base.fits(b_val as i128) {
        return base;
    }
    let wider_unsigned = match base.bit_width() {
        8 => IntegerKind::U16,
        16 => IntegerKind::U32,
        32 => IntegerKind::U64,
        _ => return if base.is_signed() {
            match base.normalized() {
                IntegerKind::I8 => IntegerKind::U8,
                IntegerKind::I16 => IntegerKind::U16,
                IntegerKind::I32 => IntegerKind::U32,
                _ => IntegerKind::U64,
            }
        } else {
            base
        },
    };
    wider_unsigned
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Integer {
    storage: i64,
    kind: IntegerKind,
}

impl Integer {
    pub fn new(value: i64, kind: IntegerKind) -> Result<Integer, ZephyrError> {
        if !kind.fits(value as i128) {
            let (lo, hi) = kind.range();
            return Err(ZephyrError::overflow(
                format!(
                    "{} out of range for {} ({}..{})",
                    value,
                    kind.type_name(),
                    lo,
                    hi
                ),
                SourceSpan::default(),
            ));
        }
        Ok(Integer { storage: value, kind })
    }

    /// Constructs without range validation; used internally once a value is
    /// already known to fit (e.g. after masking).
    fn new_unchecked(value: i64, kind: IntegerKind) -> Integer {
        Integer { storage: value, kind }
    }

    pub fn default_int(value: i64) -> Integer {
        Integer::new_unchecked(value, IntegerKind::DefaultInt)
    }

    pub fn value(&self) -> i64 {
        self.storage
    }

    pub fn value_64(&self) -> i64 {
        self.storage
    }

    pub fn kind(&self) -> IntegerKind {
        self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Masks a 64-bit bitwise result down to this kind's bit width, per the
    /// "bitwise masking" rule: results narrower than 64 bits are truncated
    /// rather than range-checked.
    pub fn apply_kind_mask(value: i64, kind: IntegerKind) -> i64 {
        let width = kind.bit_width();
        if width >= 64 {
            return value;
        }
        let mask = (1i64 << width) - 1;
        let masked = value & mask;
        if kind.is_signed() {
            let sign_bit = 1i64 << (width - 1);
            if masked & sign_bit != 0 {
                return masked | !mask;
            }
        }
        masked
    }

    pub fn checked_add(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        self.binary_checked(other, |a, b| a.checked_add(b))
    }

    pub fn checked_sub(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        self.binary_checked(other, |a, b| a.checked_sub(b))
    }

    pub fn checked_mul(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        self.binary_checked(other, |a, b| a.checked_mul(b))
    }

    pub fn checked_div(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        if other.storage == 0 {
            return Err(ZephyrError::zero_division(
                "integer division by zero",
                SourceSpan::default(),
            ));
        }
        self.binary_checked(other, |a, b| a.checked_div(b))
    }

    pub fn checked_rem(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        if other.storage == 0 {
            return Err(ZephyrError::zero_division(
                "integer modulo by zero",
                SourceSpan::default(),
            ));
        }
        self.binary_checked(other, |a, b| a.checked_rem(b))
    }

    pub fn checked_pow(&self, other: &Integer) -> Result<Integer, ZephyrError> {
        let kind = promote_with_value(self.kind, other.kind, self.storage, other.storage);
        if other.storage < 0 {
            return Err(ZephyrError::value(
                "negative exponent in integer power",
                SourceSpan::default(),
            ));
        }
        let raw = self
            .storage
            .checked_pow(other.storage as u32)
            .ok_or_else(|| overflow_err(kind))?;
        Integer::new(raw, kind)
    }

    fn binary_checked(
        &self,
        other: &Integer,
        op: impl Fn(i64, i64) -> Option<i64>,
    ) -> Result<Integer, ZephyrError> {
        let kind = promote_with_value(self.kind, other.kind, self.storage, other.storage);
        let raw = op(self.storage, other.storage).ok_or_else(|| overflow_err(kind))?;
        Integer::new(raw, kind)
    }

    pub fn bitand(&self, other: &Integer) -> Integer {
        let kind = get_promotion_kind(self.kind, other.kind);
        Integer::new_unchecked(
            Integer::apply_kind_mask(self.storage & other.storage, kind),
            kind,
        )
    }

    pub fn bitor(&self, other: &Integer) -> Integer {
        let kind = get_promotion_kind(self.kind, other.kind);
        Integer::new_unchecked(
            Integer::apply_kind_mask(self.storage | other.storage, kind),
            kind,
        )
    }

    pub fn bitxor(&self, other: &Integer) -> Integer {
        let kind = get_promotion_kind(self.kind, other.kind);
        Integer::new_unchecked(
            Integer::apply_kind_mask(self.storage ^ other.storage, kind),
            kind,
        )
    }

    pub fn bitnot(&self) -> Integer {
        Integer::new_unchecked(Integer::apply_kind_mask(!self.storage, self.kind), self.kind)
    }

    pub fn shl(&self, amount: &Integer) -> Integer {
        let shifted = self.storage.wrapping_shl(amount.storage as u32);
        Integer::new_unchecked(Integer::apply_kind_mask(shifted, self.kind), self.kind)
    }

    pub fn shr(&self, amount: &Integer) -> Integer {
        let shifted = self.storage.wrapping_shr(amount.storage as u32);
        Integer::new_unchecked(Integer::apply_kind_mask(shifted, self.kind), self.kind)
    }

    /// Widens/narrows to another kind, validating the value fits.
    pub fn convert_to(&self, kind: IntegerKind) -> Result<Integer, ZephyrError> {
        Integer::new(self.storage, kind)
    }

    pub fn as_f64(&self) -> f64 {
        self.storage as f64
    }

    pub fn create_best_fit(value: i64) -> Integer {
        for kind in [
            IntegerKind::DefaultInt,
            IntegerKind::I64,
            IntegerKind::U64,
        ] {
            if kind.fits(value as i128) {
                return Integer::new_unchecked(value, kind);
            }
        }
        Integer::new_unchecked(value, IntegerKind::I64)
    }

    pub fn from_str_with_suffix(text: &str) -> Result<Integer, ZephyrError> {
        let (digits, suffix) = split_suffix(text);
        let kind = suffix
            .map(|s| IntegerKind::from_suffix(s).ok_or_else(||
                ZephyrError::syntax(format!("invalid integer suffix '{}'", s), SourceSpan::default())))
            .transpose()?
            .unwrap_or(IntegerKind::DefaultInt);
        let value = parse_digits(digits)?;
        Integer::new(value, kind)
    }
}

fn overflow_err(kind: IntegerKind) -> ZephyrError {
    let (lo, hi) = kind.range();
    ZephyrError::overflow(
        format!("arithmetic overflow for {} ({}..{})", kind.type_name(), lo, hi),
        SourceSpan::default(),
    )
}

fn split_suffix(text: &str) -> (&str, Option<&str>) {
    for suffix in ["i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64"] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return (stripped, Some(suffix));
            }
        }
    }
    (text, None)
}

fn parse_digits(text: &str) -> Result<i64, ZephyrError> {
    let (radix, body) = if let Some(b) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (16, b)
    } else if let Some(b) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (2, b)
    } else if let Some(b) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        (8, b)
    } else {
        (10, text)
    };
    i64::from_str_radix(body, radix)
        .map_err(|e| ZephyrError::syntax(format!("invalid integer literal '{}': {}", text, e), SourceSpan::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_within_range() {
        for kind in [IntegerKind::I8, IntegerKind::U8, IntegerKind::I16, IntegerKind::U64] {
            let (lo, hi) = kind.range();
            let sample = if lo == 0 { hi / 2 } else { lo + 1 };
            let value = sample as i64;
            let i = Integer::new(value, kind).unwrap();
            assert_eq!(i.value_64(), value);
            assert_eq!(i.convert_to(kind).unwrap().value(), value);
        }
    }

    #[test]
    fn u8_overflow_rejected() {
        let err = Integer::new(300, IntegerKind::U8).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::OverflowError);
        assert!(err.message.contains("300"));
        assert!(err.message.contains("0..255"));
    }

    #[test]
    fn default_int_and_i32_interchangeable() {
        assert_eq!(IntegerKind::DefaultInt.type_name(), "int");
        assert_eq!(IntegerKind::DefaultInt.bit_width(), IntegerKind::I32.bit_width());
        let a = Integer::default_int(5);
        let b = a.convert_to(IntegerKind::I32).unwrap();
        assert_eq!(a.value(), b.value());
    }

    #[test]
    fn bitwise_masks_to_kind_width() {
        let a = Integer::new(0xFF, IntegerKind::U8).unwrap();
        let b = Integer::new(0x0F, IntegerKind::U8).unwrap();
        let r = a.bitnot();
        assert_eq!(r.value(), !0xFFi64 & 0xFF);
        let _ = b;
    }

    #[test]
    fn checked_add_overflow_detected() {
        let a = Integer::new(120, IntegerKind::I8).unwrap();
        let b = Integer::new(100, IntegerKind::I8).unwrap();
        let err = a.checked_add(&b).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::OverflowError);
    }

    #[test]
    fn division_by_zero_is_zero_division_error() {
        let a = Integer::default_int(10);
        let b = Integer::default_int(0);
        let err = a.checked_div(&b).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ZeroDivisionError);
    }

    #[test]
    fn mixed_kind_promotion_picks_wider() {
        let a = Integer::new(5, IntegerKind::I8).unwrap();
        let b = Integer::new(5, IntegerKind::I32).unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.kind(), IntegerKind::I32);
    }

    #[test]
    fn suffix_parsing() {
        let i = Integer::from_str_with_suffix("42u8").unwrap();
        assert_eq!(i.kind(), IntegerKind::U8);
        assert_eq!(i.value(), 42);
        let j = Integer::from_str_with_suffix("0xFFi16").unwrap();
        assert_eq!(j.kind(), IntegerKind::I16);
        assert_eq!(j.value(), 255);
        let k = Integer::from_str_with_suffix("10").unwrap();
        assert_eq!(k.kind(), IntegerKind::DefaultInt);
    }
}
