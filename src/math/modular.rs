//! Scalar arithmetic over Z_q

/// Modular arithmetic operations over Z_q
pub struct ModQ;

impl ModQ {
    /// Add two reduced values modulo q
    #[inline]
    pub fn add(a: u64, b: u64, q: u64) -> u64 {
        let sum = a + b;
        if sum >= q {
            sum - q
        } else {
            sum
        }
    }

    /// Subtract two reduced values modulo q
    #[inline]
    pub fn sub(a: u64, b: u64, q: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            q - (b - a)
        }
    }

    /// Multiply two values modulo q
    #[inline]
    pub fn mul(a: u64, b: u64, q: u64) -> u64 {
        ((a as u128 * b as u128) % q as u128) as u64
    }

    /// Negate a value modulo q
    #[inline]
    pub fn negate(a: u64, q: u64) -> u64 {
        if a == 0 {
            0
        } else {
            q - a
        }
    }

    /// Exponentiation by squaring
    pub fn pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
        let mut result = 1 % q;
        base %= q;
        while exp > 0 {
            if exp & 1 == 1 {
                result = Self::mul(result, base, q);
            }
            base = Self::mul(base, base, q);
            exp >>= 1;
        }
        result
    }

    /// Inverse modulo a prime q (Fermat)
    pub fn inv(a: u64, q: u64) -> u64 {
        Self::pow(a, q - 2, q)
    }

    /// Convert a signed integer to its representation in Z_q
    #[inline]
    pub fn from_signed(val: i64, q: u64) -> u64 {
        if val >= 0 {
            (val as u64) % q
        } else {
            let r = val.unsigned_abs() % q;
            if r == 0 {
                0
            } else {
                q - r
            }
        }
    }

    /// Convert from Z_q to the centered representative in [-q/2, q/2]
    #[inline]
    pub fn to_signed(val: u64, q: u64) -> i64 {
        if val <= q / 2 {
            val as i64
        } else {
            -((q - val) as i64)
        }
    }

    /// Round a real value into Z_q
    #[inline]
    pub fn from_f64(val: f64, q: u64) -> u64 {
        Self::from_signed(val.round() as i64, q)
    }

    /// Carry a value of Z_from to Z_to through its centered representative
    #[inline]
    pub fn lift_centered(val: u64, from: u64, to: u64) -> u64 {
        Self::from_signed(Self::to_signed(val, from), to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EVD_P, EVD_Q};

    const Q: u64 = EVD_Q;

    #[test]
    fn test_add_sub() {
        assert_eq!(ModQ::add(5, 7, Q), 12);
        assert_eq!(ModQ::add(Q - 1, 2, Q), 1);
        assert_eq!(ModQ::sub(10, 3, Q), 7);
        assert_eq!(ModQ::sub(3, 10, Q), Q - 7);
    }

    #[test]
    fn test_mul_and_inverse() {
        assert_eq!(ModQ::mul(5, 7, Q), 35);
        let x = 123456789;
        assert_eq!(ModQ::mul(x, ModQ::inv(x, Q), Q), 1);
        assert_eq!(ModQ::inv(EVD_P % Q, Q), 995681451208133);
    }

    #[test]
    fn test_signed_conversions() {
        assert_eq!(ModQ::from_signed(-5, Q), Q - 5);
        assert_eq!(ModQ::from_signed(0, Q), 0);
        assert_eq!(ModQ::to_signed(Q - 5, Q), -5);
        assert_eq!(ModQ::from_f64(-2.6, Q), Q - 3);
    }

    #[test]
    fn test_lift_centered() {
        assert_eq!(ModQ::lift_centered(Q - 5, Q, EVD_P), EVD_P - 5);
        assert_eq!(ModQ::lift_centered(17, Q, EVD_P), 17);
    }
}
