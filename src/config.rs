use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::BunkError;

pub const DEFAULT_THRESHOLD: &str = "0.75";
pub const DEFAULT_INPUT: &str = "attendance.json";

const MAX_DECIMALS: usize = 9;

/// Exact non-negative rational kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    num: u64,
    den: u64,
}

impl Fraction {
    pub fn new(num: u64, den: u64) -> Result<Self, BunkError> {
        if den == 0 {
            return Err(BunkError::Policy("denominator must be non-zero".to_string()));
        }
        let divisor = gcd(num, den);
        Ok(Fraction {
            num: num / divisor,
            den: den / divisor,
        })
    }

    pub fn num(&self) -> u64 {
        self.num
    }

    pub fn den(&self) -> u64 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn percent(&self) -> f64 {
        self.as_f64() * 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_at_least_one(&self) -> bool {
        self.num >= self.den
    }

    /// Sum, saturating at one; policy fractions never exceed a full attendance ratio.
    pub fn saturating_add_capped(self, other: Fraction) -> Fraction {
        if self.is_at_least_one() || other.is_at_least_one() {
            return Fraction::one();
        }
        let den = self.den as u128 * other.den as u128;
        let num = self.num as u128 * other.den as u128 + other.num as u128 * self.den as u128;
        if num >= den {
            return Fraction::one();
        }
        let divisor = gcd_u128(num, den);
        Fraction {
            num: (num / divisor) as u64,
            den: (den / divisor) as u64,
        }
    }

    fn one() -> Fraction {
        Fraction { num: 1, den: 1 }
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as u128 * other.den as u128;
        let rhs = other.num as u128 * self.den as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

/// Accepts a decimal fraction (`0.75`, `.75`) or a percentage (`75%`, `75.5%`).
impl FromStr for Fraction {
    type Err = BunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || BunkError::Policy(format!("'{s}' is not a decimal fraction or percentage"));

        let (digits, percent) = match text.strip_suffix('%') {
            Some(rest) => (rest.trim_end(), true),
            None => (text, false),
        };

        let (whole, decimals) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && decimals.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().chain(decimals.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if whole.len() > MAX_DECIMALS || decimals.len() > MAX_DECIMALS {
            return Err(BunkError::Policy(format!(
                "'{s}' has more than {MAX_DECIMALS} digits on one side of the decimal point"
            )));
        }

        let scale = 10u64.pow(decimals.len() as u32);
        let whole_value: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let decimal_value: u64 = if decimals.is_empty() { 0 } else { decimals.parse().map_err(|_| invalid())? };

        let num = whole_value * scale + decimal_value;
        let den = if percent { scale * 100 } else { scale };
        Fraction::new(num, den)
    }
}

/// Threshold plus the cosmetic safe-zone boundary shown next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    threshold: Fraction,
    safe_zone: Fraction,
}

impl Policy {
    pub fn new(threshold: Fraction, safe_zone: Option<Fraction>) -> Result<Self, BunkError> {
        if threshold.is_zero() || threshold.is_at_least_one() {
            return Err(BunkError::Policy(format!(
                "threshold must be strictly between 0 and 1, got {}",
                threshold.as_f64()
            )));
        }

        let safe_zone = match safe_zone {
            Some(zone) => {
                if zone < threshold {
                    return Err(BunkError::Policy(format!(
                        "safe zone {zone} is below the threshold {threshold}"
                    )));
                }
                if zone > Fraction::one() {
                    return Err(BunkError::Policy(format!("safe zone {zone} exceeds 100%")));
                }
                zone
            }
            None => threshold.saturating_add_capped(Fraction { num: 1, den: 100 }),
        };

        Ok(Policy {
            threshold,
            safe_zone,
        })
    }

    pub fn threshold(&self) -> Fraction {
        self.threshold
    }

    pub fn safe_zone(&self) -> Fraction {
        self.safe_zone
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            threshold: Fraction { num: 3, den: 4 },
            safe_zone: Fraction { num: 19, den: 25 },
        }
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    gcd_u128(a as u128, b as u128) as u64
}

fn gcd_u128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a.max(1)
}
