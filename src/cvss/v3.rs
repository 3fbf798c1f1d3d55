//! CVSS v3.0 / v3.1 base vectors.
//!
//! Base score equations from the CVSS v3.1 specification, section 7.1:
//! <https://www.first.org/cvss/specification-document#t6>

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::CvssError;

/// A parsed CVSS v3.x base vector.
#[derive(Debug, Copy, Clone)]
pub struct CvssV3 {
    pub minor_version: u8,
    av: AttackVector,
    ac: AttackComplexity,
    pr: PrivilegesRequired,
    ui: UserInteraction,
    scope_changed: bool,
    c: Impact,
    i: Impact,
    a: Impact,
}

impl CvssV3 {
    /// Compute the base score, rounded up per CVSS v3.1 Appendix A.
    #[must_use]
    pub fn score(&self) -> f64 {
        let iss = self.impact_sub_score();
        let impact = if self.scope_changed {
            (7.52 * (iss - 0.029)) - (3.25 * (iss - 0.02).powf(15.0))
        } else {
            6.42 * iss
        };
        if impact <= 0.0 {
            return 0.0;
        }
        let exploitability = 8.22
            * self.av.weight()
            * self.ac.weight()
            * self.pr.weight(self.scope_changed)
            * self.ui.weight();
        let raw = if self.scope_changed {
            (1.08 * (impact + exploitability)).min(10.0)
        } else {
            (impact + exploitability).min(10.0)
        };
        roundup(raw)
    }

    fn impact_sub_score(&self) -> f64 {
        1.0 - ((1.0 - self.c.weight()) * (1.0 - self.i.weight()) * (1.0 - self.a.weight()))
    }
}

/// Round up to one decimal, per CVSS v3.1 Appendix A - Floating Point
/// Rounding.
fn roundup(score: f64) -> f64 {
    let score_int = (score * 100_000.0) as u64;
    if score_int % 10_000 == 0 {
        (score_int as f64) / 100_000.0
    } else {
        (((score_int as f64) / 10_000.0).floor() + 1.0) / 10.0
    }
}

impl FromStr for CvssV3 {
    type Err = CvssError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split('/').collect::<Vec<_>>();
        if parts.len() != 9 {
            return Err(CvssError::Invalid);
        }
        let minor_version = match parts[0] {
            "CVSS:3.1" => 1,
            "CVSS:3.0" => 0,
            _ => return Err(CvssError::Version),
        };
        Ok(Self {
            minor_version,
            av: AttackVector::from_metric(parts[1])?,
            ac: AttackComplexity::from_metric(parts[2])?,
            pr: PrivilegesRequired::from_metric(parts[3])?,
            ui: UserInteraction::from_metric(parts[4])?,
            scope_changed: parse_scope(parts[5])?,
            c: Impact::from_metric(parts[6], "C")?,
            i: Impact::from_metric(parts[7], "I")?,
            a: Impact::from_metric(parts[8], "A")?,
        })
    }
}

/// Strip `"{key}:"` and return the single value character.
fn metric_value(part: &str, key: &'static str) -> Result<char, CvssError> {
    part.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| {
            let mut chars = rest.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        })
        .ok_or(CvssError::Metric(key))
}

fn parse_scope(part: &str) -> Result<bool, CvssError> {
    match metric_value(part, "S")? {
        'U' => Ok(false),
        'C' => Ok(true),
        _ => Err(CvssError::Metric("S")),
    }
}

#[derive(Debug, Copy, Clone)]
enum AttackVector {
    Network,
    Adjacent,
    Local,
    Physical,
}

impl AttackVector {
    fn from_metric(part: &str) -> Result<Self, CvssError> {
        match metric_value(part, "AV")? {
            'N' => Ok(Self::Network),
            'A' => Ok(Self::Adjacent),
            'L' => Ok(Self::Local),
            'P' => Ok(Self::Physical),
            _ => Err(CvssError::Metric("AV")),
        }
    }

    fn weight(self) -> f64 {
        match self {
            Self::Network => 0.85,
            Self::Adjacent => 0.62,
            Self::Local => 0.55,
            Self::Physical => 0.20,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum AttackComplexity {
    Low,
    High,
}

impl AttackComplexity {
    fn from_metric(part: &str) -> Result<Self, CvssError> {
        match metric_value(part, "AC")? {
            'L' => Ok(Self::Low),
            'H' => Ok(Self::High),
            _ => Err(CvssError::Metric("AC")),
        }
    }

    fn weight(self) -> f64 {
        match self {
            Self::Low => 0.77,
            Self::High => 0.44,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum PrivilegesRequired {
    None,
    Low,
    High,
}

impl PrivilegesRequired {
    fn from_metric(part: &str) -> Result<Self, CvssError> {
        match metric_value(part, "PR")? {
            'N' => Ok(Self::None),
            'L' => Ok(Self::Low),
            'H' => Ok(Self::High),
            _ => Err(CvssError::Metric("PR")),
        }
    }

    // The weight rises when the scope changes.
    fn weight(self, scope_changed: bool) -> f64 {
        match (self, scope_changed) {
            (Self::None, _) => 0.85,
            (Self::Low, false) => 0.62,
            (Self::Low, true) => 0.68,
            (Self::High, false) => 0.27,
            (Self::High, true) => 0.50,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum UserInteraction {
    None,
    Required,
}

impl UserInteraction {
    fn from_metric(part: &str) -> Result<Self, CvssError> {
        match metric_value(part, "UI")? {
            'N' => Ok(Self::None),
            'R' => Ok(Self::Required),
            _ => Err(CvssError::Metric("UI")),
        }
    }

    fn weight(self) -> f64 {
        match self {
            Self::None => 0.85,
            Self::Required => 0.62,
        }
    }
}

/// Confidentiality, integrity and availability impacts share their scale.
#[derive(Debug, Copy, Clone)]
enum Impact {
    None,
    Low,
    High,
}

impl Impact {
    fn from_metric(part: &str, key: &'static str) -> Result<Self, CvssError> {
        match metric_value(part, key)? {
            'N' => Ok(Self::None),
            'L' => Ok(Self::Low),
            'H' => Ok(Self::High),
            _ => Err(CvssError::Metric(key)),
        }
    }

    fn weight(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Low => 0.22,
            Self::High => 0.56,
        }
    }
}

impl Display for CvssV3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CVSS:3.{}", self.minor_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_vector() {
        let cvss: CvssV3 = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            .parse()
            .unwrap();
        assert_eq!(cvss.minor_version, 1);
        assert!((cvss.score() - 9.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scope_changed_vector() {
        let cvss: CvssV3 = "CVSS:3.0/AV:N/AC:L/PR:L/UI:N/S:C/C:H/I:H/A:H"
            .parse()
            .unwrap();
        assert!((cvss.score() - 9.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_impact_is_zero() {
        let cvss: CvssV3 = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:N"
            .parse()
            .unwrap();
        assert_eq!(cvss.score(), 0.0);
    }

    #[test]
    fn test_medium_vector() {
        let cvss: CvssV3 = "CVSS:3.1/AV:N/AC:H/PR:N/UI:R/S:U/C:L/I:L/A:N"
            .parse()
            .unwrap();
        assert!((cvss.score() - 4.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_wrong_part_count() {
        assert!("CVSS:3.1/AV:N/AC:L".parse::<CvssV3>().is_err());
    }

    #[test]
    fn test_rejects_unknown_metric_value() {
        assert!("CVSS:3.1/AV:X/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            .parse::<CvssV3>()
            .is_err());
    }

    #[test]
    fn test_rejects_v4_prefix() {
        assert!("CVSS:4.0/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            .parse::<CvssV3>()
            .is_err());
    }
}
