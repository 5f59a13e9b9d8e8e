use crate::config::{Fraction, Policy};
use crate::error::BunkError;
use crate::models::{Analysis, Measurement, Outcome, Projection, Status, SubjectRecord};

pub fn analyze_all(
    records: &[SubjectRecord],
    policy: &Policy,
    remaining: Option<u64>,
) -> Result<Vec<Analysis>, BunkError> {
    records
        .iter()
        .map(|record| analyze(record, policy, remaining))
        .collect()
}

pub fn analyze(
    record: &SubjectRecord,
    policy: &Policy,
    remaining: Option<u64>,
) -> Result<Analysis, BunkError> {
    let SubjectRecord {
        name,
        held,
        attended,
    } = record;
    let (held, attended) = (*held, *attended);

    if attended > held {
        return Err(BunkError::InvalidRecord {
            subject: name.clone(),
            held,
            attended,
        });
    }

    let outcome = if held == 0 {
        Outcome::NoData
    } else {
        let threshold = policy.threshold();
        let percentage = 100.0 * attended as f64 / held as f64;
        let status = if meets(attended, held, threshold) {
            Status::Safe
        } else {
            Status::Danger
        };

        Outcome::Measured(Measurement {
            percentage,
            status,
            buffer: buffer(held, attended, threshold),
            skippable: skippable(held, attended, threshold),
            needed: needed(held, attended, threshold),
            in_safe_zone: meets(attended, held, policy.safe_zone()),
            projection: remaining.map(|remaining| Projection {
                remaining,
                max_skips: max_skips_over(held, attended, remaining, threshold),
            }),
        })
    };

    Ok(Analysis {
        subject: name.clone(),
        held,
        attended,
        outcome,
    })
}

/// `attended / held >= ratio`, compared without division.
pub fn meets(attended: u64, held: u64, ratio: Fraction) -> bool {
    attended as u128 * ratio.den() as u128 >= ratio.num() as u128 * held as u128
}

/// Signed distance from the threshold in percentage points. The sign comes from
/// the exact numerator `attended*q - p*held`, so a record on the threshold is `0.0`.
pub fn buffer(held: u64, attended: u64, threshold: Fraction) -> f64 {
    let (p, q) = (threshold.num() as i128, threshold.den() as i128);
    let slack = attended as i128 * q - p * held as i128;
    100.0 * slack as f64 / (held as f64 * q as f64)
}

/// Largest `k` with `attended / (held + k) >= threshold`; zero when already below.
pub fn skippable(held: u64, attended: u64, threshold: Fraction) -> u64 {
    let (p, q) = (threshold.num() as u128, threshold.den() as u128);
    let have = attended as u128 * q;
    let want = p * held as u128;
    if have < want || p == 0 {
        return 0;
    }
    clamp_u64((have - want) / p)
}

/// Smallest `n` with `(attended + n) / (held + n) >= threshold`.
pub fn needed(held: u64, attended: u64, threshold: Fraction) -> u64 {
    let (p, q) = (threshold.num() as u128, threshold.den() as u128);
    let have = attended as u128 * q;
    let want = p * held as u128;
    if have >= want || q <= p {
        return 0;
    }
    clamp_u64((want - have).div_ceil(q - p))
}

/// Most of the next `remaining` classes that can be missed while the final ratio
/// still meets `threshold`.
pub fn max_skips_over(held: u64, attended: u64, remaining: u64, threshold: Fraction) -> Option<u64> {
    let (p, q) = (threshold.num() as u128, threshold.den() as u128);
    let best = (attended as u128 + remaining as u128) * q;
    let want = p * (held as u128 + remaining as u128);
    if best < want {
        return None;
    }
    Some(clamp_u64((best - want) / q).min(remaining))
}

fn clamp_u64(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
