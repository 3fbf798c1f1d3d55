//! CVSS v2 base vectors.
//!
//! Base score equations from the CVSS v2 guide, section 3.2.1:
//! <https://www.first.org/cvss/v2/guide#3-2-1-Base-Equation>

use std::str::FromStr;

use super::CvssError;

/// A parsed CVSS v2 base vector, e.g. `AV:N/AC:L/Au:N/C:P/I:P/A:P`.
///
/// The optional `CVSS:2.0/` prefix some feeds emit is accepted.
#[derive(Debug, Copy, Clone)]
pub struct CvssV2 {
    av: f64,
    ac: f64,
    au: f64,
    c: f64,
    i: f64,
    a: f64,
}

impl CvssV2 {
    /// Compute the base score, rounded to one decimal.
    #[must_use]
    pub fn score(&self) -> f64 {
        let impact = 10.41 * (1.0 - (1.0 - self.c) * (1.0 - self.i) * (1.0 - self.a));
        let exploitability = 20.0 * self.av * self.ac * self.au;
        let f_impact = if impact == 0.0 { 0.0 } else { 1.176 };
        let raw = ((0.6 * impact) + (0.4 * exploitability) - 1.5) * f_impact;
        (raw * 10.0).round() / 10.0
    }
}

impl FromStr for CvssV2 {
    type Err = CvssError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("CVSS:2.0/").unwrap_or(s);
        let parts = s.split('/').collect::<Vec<_>>();
        if parts.len() != 6 {
            return Err(CvssError::Invalid);
        }
        Ok(Self {
            av: weight(parts[0], "AV", &[('L', 0.395), ('A', 0.646), ('N', 1.0)])?,
            ac: weight(parts[1], "AC", &[('H', 0.35), ('M', 0.61), ('L', 0.71)])?,
            au: weight(parts[2], "Au", &[('M', 0.45), ('S', 0.56), ('N', 0.704)])?,
            c: weight(parts[3], "C", &[('N', 0.0), ('P', 0.275), ('C', 0.660)])?,
            i: weight(parts[4], "I", &[('N', 0.0), ('P', 0.275), ('C', 0.660)])?,
            a: weight(parts[5], "A", &[('N', 0.0), ('P', 0.275), ('C', 0.660)])?,
        })
    }
}

fn weight(part: &str, key: &'static str, table: &[(char, f64)]) -> Result<f64, CvssError> {
    let value = part
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| {
            let mut chars = rest.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        })
        .ok_or(CvssError::Metric(key))?;
    table
        .iter()
        .find(|(c, _)| *c == value)
        .map(|(_, w)| *w)
        .ok_or(CvssError::Metric(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_medium_vector() {
        let cvss: CvssV2 = "AV:N/AC:L/Au:N/C:P/I:P/A:P".parse().unwrap();
        assert!((cvss.score() - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prefixed_vector() {
        let cvss: CvssV2 = "CVSS:2.0/AV:N/AC:L/Au:N/C:C/I:C/A:C".parse().unwrap();
        assert!((cvss.score() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_impact_is_zero() {
        let cvss: CvssV2 = "AV:N/AC:L/Au:N/C:N/I:N/A:N".parse().unwrap();
        assert_eq!(cvss.score(), 0.0);
    }

    #[test]
    fn test_rejects_v3_vector() {
        assert!("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            .parse::<CvssV2>()
            .is_err());
    }
}
